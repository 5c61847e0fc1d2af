//! Bearer credentials for Huddle connections.
//!
//! Access and refresh tokens are HS256 JWTs. Only access tokens admit a
//! realtime connection; refresh tokens exist solely to mint new access
//! tokens through the external refresh flow.

pub mod claims;
pub mod directory;
pub mod issuer;
pub mod validator;

pub use claims::{Claims, TokenKind};
pub use directory::{AccountDirectory, DirectoryError, Identity};
pub use issuer::{IssueError, TokenIssuer};
pub use validator::{CredentialError, CredentialValidator};
