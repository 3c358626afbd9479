//! Adapters from the pipeline's traits to real services.
//!
//! [`aws`] talks to STS and KMS through the AWS SDK; [`cluster`] talks to the
//! cluster for service-account tokens and `EncryptionKey` storage.

pub mod aws;
pub mod cluster;
