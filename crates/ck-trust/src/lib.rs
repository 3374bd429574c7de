//! # ck-trust
//!
//! The two stateful authorities the kernel consults before accepting any
//! credential:
//!
//! - [`TrustEpochManager`]: the active signing-key generation, the trust
//!   epoch, and the set of revoked key versions. A credential bound to
//!   anything other than the current key and epoch is rejected.
//! - [`ConsumedTokenStore`]: a single-use ledger. A token id is accepted at
//!   most once for the lifetime of the ledger file, across restarts.
//!
//! Both persist through [`persist`], which writes to a temporary file, keeps
//! the previous version as a `.bak`, and atomically renames into place.

pub mod epoch;
pub mod error;
pub mod persist;
pub mod token_store;

pub use epoch::{TrustEpochManager, TrustState, TrustUpdate};
pub use error::{PersistError, TokenStoreError, TrustError};
pub use token_store::{ConsumedToken, ConsumedTokenStore};
