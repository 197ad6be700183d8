//! Collaborators used by account flows: mail delivery and avatar hosting

pub mod avatar;
pub mod mailer;

pub use avatar::{AvatarStore, AvatarUpload, CloudinaryStore, MemoryAvatarStore, UploadError};
pub use mailer::{EmailMessage, LogMailer, MailError, Mailer, OutboxMailer};
