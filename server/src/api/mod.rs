//! RPC surface of the server

pub mod grpc;

pub use grpc::AuthGrpcServer;
