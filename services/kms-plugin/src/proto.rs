//! Kubernetes KMS `v1beta1` wire types and generated gRPC stubs.
//!
//! Field numbers match `k8s.io/apiserver/pkg/storage/value/encrypt/envelope/v1beta1/service.proto`.

#![allow(missing_docs)]

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionRequest {
    /// Version of the KMS API requested by the caller.
    #[prost(string, tag = "1")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionResponse {
    /// Version of the KMS API implemented by the plugin.
    #[prost(string, tag = "1")]
    pub version: String,
    /// Name of the KMS provider.
    #[prost(string, tag = "2")]
    pub runtime_name: String,
    /// Version of the KMS provider.
    #[prost(string, tag = "3")]
    pub runtime_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptRequest {
    #[prost(string, tag = "1")]
    pub version: String,
    /// Data to decrypt.
    #[prost(bytes = "vec", tag = "2")]
    pub cipher: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub plain: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptRequest {
    #[prost(string, tag = "1")]
    pub version: String,
    /// Data to encrypt.
    #[prost(bytes = "vec", tag = "2")]
    pub plain: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub cipher: Vec<u8>,
}

include!(concat!(env!("OUT_DIR"), "/v1beta1.KeyManagementService.rs"));
