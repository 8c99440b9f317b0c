//! Calendar-driven services: birthday announcements and the holiday
//! calendar that can silence a whole day of automated cues.

pub mod birthdays;
pub mod holidays;

pub use birthdays::BirthdayService;
pub use holidays::HolidayService;
