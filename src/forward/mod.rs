// Port-forward fleet
//
// One tunnel per broker bridges a local TCP listener to the pod's Kafka
// listener through the Kubernetes API server; the supervisor owns the
// fleet, aggregates readiness and errors, and drives shutdown.

mod supervisor;
mod tunnel;

pub use supervisor::Fleet;
pub use tunnel::PortForward;
