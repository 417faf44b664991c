//! Filter application and result pagination

pub mod driver;
pub mod page;

pub use driver::NavigationDriver;
pub use page::{PageLoad, RawResultPage};
