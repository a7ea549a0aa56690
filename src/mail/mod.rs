// mail/ — Everything that talks about provider messages.
//
// Provides:
// - Gmail payload types and the single/multi-part shape
// - Normalization into canonical records
// - The provider trait and its Gmail REST implementation
// - Cached OAuth token handling

pub mod auth;
pub mod gmail;
pub mod message;
pub mod normalize;
