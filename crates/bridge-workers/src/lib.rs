pub mod adapters;
pub mod analytics;
pub mod ingress;
pub mod worker;

pub use analytics::{Anomaly, AnomalyKind, LoadPrediction, OperatorSurface, PerformanceReport, Severity, Trend};
pub use ingress::IngressRouter;
pub use worker::EgressWorker;
