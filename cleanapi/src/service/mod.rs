pub mod bookings;
pub mod dashboard;
pub mod reviews;

pub use bookings::BookingService;
pub use dashboard::DashboardService;
pub use reviews::ReviewService;
