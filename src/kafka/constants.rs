//! Kafka protocol constants
//!
//! Centralizes the magic numbers used on the proxy path.
//!
//! # Terminology
//! - **API Key**: Identifies which operation/request type (e.g., 18 = ApiVersions, 3 = Metadata)
//! - **API Version**: Identifies which version of that operation (e.g., Metadata v9)

// ===== API Keys =====
// The api keys whose bodies the proxy decodes. Everything else is forwarded
// byte-for-byte without being parsed.
// See: https://kafka.apache.org/protocol.html#protocol_api_key

/// API key for Produce responses
///
/// Produce responses may carry node endpoints (v10+) that advertise broker addresses
pub const API_KEY_PRODUCE: i16 = 0;

/// API key for Fetch responses
///
/// Fetch responses may carry node endpoints (v16+) that advertise broker addresses
pub const API_KEY_FETCH: i16 = 1;

/// API key for Metadata responses
///
/// The primary channel through which brokers advertise their addresses
pub const API_KEY_METADATA: i16 = 3;

/// API key for FindCoordinator responses
///
/// Advertises the coordinator address, either as a single endpoint (v0-v3)
/// or as a batch of coordinators (v4+)
pub const API_KEY_FIND_COORDINATOR: i16 = 10;

/// API key for ApiVersions requests and responses
///
/// Carries no endpoint fields; decoded and re-encoded to exercise the codec path
pub const API_KEY_API_VERSIONS: i16 = 18;

/// API key for DescribeCluster responses
///
/// Advertises broker addresses when the endpoint type is the broker listener
pub const API_KEY_DESCRIBE_CLUSTER: i16 = 60;

/// API key for ShareFetch responses
///
/// Share group fetches may carry node endpoints that advertise broker addresses
pub const API_KEY_SHARE_FETCH: i16 = 78;

/// API key for ShareAcknowledge responses
///
/// Share group acknowledgements may carry node endpoints as well
pub const API_KEY_SHARE_ACKNOWLEDGE: i16 = 79;

// ===== Protocol Limits =====

/// Maximum frame size (100MB)
///
/// Frames larger than this are treated as malformed rather than buffered
pub const MAX_FRAME_SIZE: i32 = 100_000_000;

// ===== Endpoint Rewriting =====

/// Host substituted into every rewritten endpoint
pub const LOCAL_HOST: &str = "localhost";

// ===== Configuration Defaults =====

/// Default port of the plaintext Kafka listener inside the cluster
pub const DEFAULT_LISTENER_PORT: u16 = 9092;

/// First local port handed out to the broker with the lowest node id
pub const DEFAULT_STARTING_PORT: u16 = 50000;

/// Minimum allowed local port (above privileged ports)
pub const MIN_LOCAL_PORT: u16 = 1024;
