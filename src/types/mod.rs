//! Shared primitive types.

mod call;
pub use call::*;

mod contracts;
pub use contracts::*;

mod credential;
pub use credential::*;

mod owner;
pub use owner::*;

mod user_op;
pub use user_op::*;

mod webauthn;
pub use webauthn::*;
