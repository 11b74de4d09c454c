pub mod enterprise;
pub mod mock;

pub use enterprise::{EnterpriseAdapter, EnterpriseClient, FetchOutcome};
pub use mock::{InMemoryEgressAdapter, InMemoryIngressAdapter, NullEnterpriseClient};
