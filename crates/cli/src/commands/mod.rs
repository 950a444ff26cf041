pub mod init;
pub mod learn;
pub mod list;
pub mod score;
pub mod sigs;
pub mod util;

pub use init::*;
pub use learn::*;
pub use list::*;
pub use score::*;
pub use sigs::*;
pub use util::*;
