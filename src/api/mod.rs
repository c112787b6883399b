//! Surface used by an HTTP controller: slip sources in, JSON bodies out.

pub mod response;
pub mod slip;

pub use response::SlipResponse;
pub use slip::{decode_data_uri, resolve_slip_path, verify_stored_slip};
