pub const CF_METADATA: &str = "metadata";
pub const CF_PROVIDER: &str = "provider";

pub const SCHEMA_VERSION: u32 = 1;
pub const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
