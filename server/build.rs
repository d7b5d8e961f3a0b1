// Generates tonic client/server stubs for the two internal gRPC contracts.
// The ingestion contract only needs a client (the server side lives in the
// ingestion service); the auth contract only needs a server.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    unsafe {
        std::env::set_var("PROTOC", protobuf_src::protoc());
    }

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/ingestion.proto"], &["proto"])?;

    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/auth.proto"], &["proto"])?;

    Ok(())
}
