// Kafka protocol side of the proxy
//
// Wire format handled here:
// [4 bytes: Size (big-endian i32)] [Header] [Body]
//
// The kafka-protocol crate provides the generated structs for headers and
// message bodies; these modules own the framing, the correlation tracking
// between requests and responses, and the endpoint rewriting.
//
// Module organization:
// - constants: api keys, limits, defaults
// - frame: frame codec and the correlation tracker
// - rewrite: per-api-key decode/mutate/encode dispatch
// - proxy: the two pumps of one proxied connection

pub mod constants;
pub mod frame;
pub mod proxy;
pub mod rewrite;
