//! Suites bundled with the `trellis` binary.

pub mod account;

use crate::runner::Suite;

pub fn all() -> Vec<Suite> {
    vec![account::account_page(), account::stubbing_geolocation()]
}
