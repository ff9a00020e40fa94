//! Generates the `v1beta1.KeyManagementService` server and client stubs.
//!
//! Messages are declared by hand in `src/proto.rs`, so the service is
//! described with the manual builder and no `protoc` is needed at build time.

use tonic_build::manual::{Builder, Method, Service};

fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{input}"))
        .output_type(format!("crate::proto::{output}"))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let service = Service::builder()
        .name("KeyManagementService")
        .package("v1beta1")
        .comment("Kubernetes KMS envelope encryption service, protocol version v1beta1.")
        .method(unary("version", "Version", "VersionRequest", "VersionResponse"))
        .method(unary("decrypt", "Decrypt", "DecryptRequest", "DecryptResponse"))
        .method(unary("encrypt", "Encrypt", "EncryptRequest", "EncryptResponse"))
        .build();

    Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[service]);

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=KMS_PLUGIN_BUILD_VERSION");
}
