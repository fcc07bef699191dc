use tonic_build::manual::{Builder, Method, Service};

fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::grpc::{input}"))
        .output_type(format!("crate::grpc::{output}"))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let events = Service::builder()
        .name("EventService")
        .package("calendar")
        .method(unary("create_event", "CreateEvent", "Event", "Id"))
        .method(unary("select_events", "SelectEvents", "Void", "Events"))
        .method(unary("update_event", "UpdateEvent", "Event", "Void"))
        .method(unary("delete_event", "DeleteEvent", "Id", "Void"))
        .method(unary("select_events_for_day", "SelectEventsForDay", "DateRequest", "Events"))
        .method(unary("select_events_for_week", "SelectEventsForWeek", "DateRequest", "Events"))
        .method(unary("select_events_for_month", "SelectEventsForMonth", "DateRequest", "Events"))
        .build();

    let users = Service::builder()
        .name("UserService")
        .package("calendar")
        .method(unary("create_user", "CreateUser", "User", "Id"))
        .method(unary("select_users", "SelectUsers", "Void", "Users"))
        .method(unary("delete_user", "DeleteUser", "Id", "Void"))
        .build();

    Builder::new().compile(&[events, users]);
    println!("cargo:rerun-if-changed=build.rs");
}
