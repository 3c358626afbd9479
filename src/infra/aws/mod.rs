//! AWS implementations of [`IdentityFederation`](crate::federation::IdentityFederation)
//! and [`KeyDescriptor`](crate::keys::KeyDescriptor).

mod kms;
mod sts;

pub use kms::KmsKeyDescriptor;
pub use sts::StsFederation;

use chrono::{DateTime, Utc};

/// Converts an SDK timestamp (shared by the STS and KMS crates), dropping
/// values chrono cannot represent.
fn to_utc(dt: &aws_sdk_kms::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}
