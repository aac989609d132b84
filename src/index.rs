//! HTTP access to the decentralized attestation index and its payload store.
//! The index is queried per oracle identity with a GraphQL-style document;
//! payloads are fetched by locator from a gateway.

pub mod client;
pub mod gateway;

pub use client::AttestationIndexClient;
pub use gateway::{FetchError, PayloadGateway, PayloadStore};
