//! Live trip tracking and pickup verification.
//!
//! Leaves first: coordinate validation, the location throttle, the position
//! acquisition loop, route and straight-line distance, the trip phase state
//! machine and the pickup code protocol. [`TrackingSession`] wires them
//! together for one booking on one device.

pub mod booking;
pub mod config;
pub mod coordinate;
pub mod delivery;
pub mod error;
pub mod otp;
pub mod phase;
pub mod position;
pub mod proximity;
pub mod refine;
pub mod route;
pub mod session;
pub mod store;
pub mod throttle;

pub use booking::{Booking, Place};
pub use config::TrackingConfig;
pub use coordinate::{validate, Coordinate};
pub use delivery::{LogOtpDelivery, OtpDelivery};
pub use error::{TrackingError, TrackingResult};
pub use otp::{OtpState, PickupOtp};
pub use phase::{BookingStatus, RouteTarget};
pub use position::{
    AcquisitionState, LocationProvider, PositionAcquisition, PositionError, PositionEvent,
    PositionOptions, PositionWatch, WatchId,
};
pub use proximity::{Proximity, ProximityCalculator};
pub use refine::{PositionRefiner, Refinement, ReverseGeocodeRefiner};
pub use route::{
    compute_route, route_preview, OsrmRoutingProvider, RouteOutcome, RouteResult, RouteTracker,
    RoutingProvider,
};
pub use session::{SessionDeps, SessionRole, TrackingSession, TrackingView};
pub use store::{BookingStore, InMemoryBookingStore};
pub use throttle::{LocationSample, LocationThrottle};
