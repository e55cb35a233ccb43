pub mod admission;
pub mod capacity;
pub mod clock;
pub mod hiatus;
pub mod invites;
pub mod join_requests;
pub mod notifier;
pub mod outcome;
pub mod policy;
pub mod settings;

pub use admission::{AdmissionEngine, InviteAcceptance};
pub use clock::{Clock, ManualClock, SystemClock};
pub use notifier::{LogNotifier, Notification, Notifier};
pub use outcome::{AdmissionStatus, Outcome};
pub use policy::{Caller, Decision, PolicyAction, SystemRole};
pub use settings::{SettingsStore, TeamSettingsSnapshot, keys};
