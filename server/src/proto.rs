//! Generated gRPC bindings for the internal service contracts.

pub mod ingestion {
    pub mod v1 {
        tonic::include_proto!("junjo.ingestion.v1");
    }
}

pub mod auth {
    pub mod v1 {
        tonic::include_proto!("junjo.auth.v1");
    }
}
