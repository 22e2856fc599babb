//! AWS provider descriptor.

use std::time::Duration;

use cloudmon_core::{ProviderDescriptor, QueryKind};

/// Credential field holding the access key id.
pub const ACCESS_KEY_ID: &str = "access_key_id";

/// Credential field holding the secret access key.
pub const SECRET_ACCESS_KEY: &str = "secret_access_key";

/// Optional credential field naming the EC2 region.
pub const REGION: &str = "region";

/// Optional credential field holding an STS session token.
pub const SESSION_TOKEN: &str = "session_token";

/// Builds the AWS descriptor.
///
/// Cost Explorer bills every request, hence the hourly default.
pub fn aws_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder("aws")
        .display_name("Amazon Web Services")
        .capability(QueryKind::Cost)
        .capability(QueryKind::InstanceList)
        .poll_interval(Duration::from_secs(60 * 60))
        .credential(ACCESS_KEY_ID, "Access key ID")
        .credential(SECRET_ACCESS_KEY, "Secret access key")
        .optional_credential(REGION, "Region")
        .optional_credential(SESSION_TOKEN, "Session token")
        .dashboard_url("https://console.aws.amazon.com/cost-management/home")
        .build()
}
