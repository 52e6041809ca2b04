//! Generated gRPC contracts shared between services.

pub mod user {
    tonic::include_proto!("user");
}
