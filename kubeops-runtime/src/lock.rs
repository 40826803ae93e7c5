//! Compare-and-set primitives over a `coordination.k8s.io/v1` `Lease`, used by [`lease`](crate::lease)
//! to implement leader election.

pub(crate) mod raw;
