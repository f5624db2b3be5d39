//! Timing capture: performs one HTTP exchange and reports its phases.

mod connector;
mod http;
mod resolver;
mod scope;
mod traits;

pub use connector::{ConnectTiming, ConnectTimingLayer};
pub use http::{CaptureOptions, HttpCapture, DEFAULT_USER_AGENT, MAX_REDIRECTS};
pub use resolver::TimedResolver;
pub use scope::{ConnectionPhases, RequestScope, Route};
pub use traits::{Request, TimingCapture};
