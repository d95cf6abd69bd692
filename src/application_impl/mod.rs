mod credential_hasher_argon2;
mod session_service_impl;
mod token_codec_jwt;

pub use credential_hasher_argon2::*;
pub use session_service_impl::*;
pub use token_codec_jwt::*;

#[cfg(test)]
pub(crate) use credential_hasher_argon2::tests::cheap_hasher;
#[cfg(test)]
pub(crate) use token_codec_jwt::tests::test_config;
