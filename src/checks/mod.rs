//! Check adapters
//!
//! One adapter per probe family. Adapters never retry and never raise:
//! every failure is folded into the returned result.
//!
//! | Kind       | Adapter                        | External seam        |
//! |------------|--------------------------------|----------------------|
//! | services   | `services::check_services`     | `ProcessSupervisor`  |
//! | health     | `health::check_health`         | `EndpointProbe`      |
//! | resources  | `resources::sample_resources`  | `ResourceSampler`    |
//! | disk       | `resources::sample_disk`       | `ResourceSampler`    |
//! | billing    | `billing::check_billing`       | `BillingSource`      |

pub mod billing;
pub mod health;
pub mod resources;
pub mod services;

pub use billing::{BillingError, BillingSource, OpenAiBilling, TimewebBilling};
pub use health::{EndpointProbe, HttpProbe, ProbeError, ProbeResponse};
pub use resources::{HostSampler, ResourceSampler, SampleError};
pub use services::{ProcessSupervisor, SupervisorError, SystemdSupervisor};
