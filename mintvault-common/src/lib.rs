pub mod backend;
pub mod documents;
pub mod hash;
pub mod identity;

pub use backend::{
    BlobBackend, Downloaded, NullBackend, ProfileBackend, RemoteAck, RemoteError, RemoteUpload,
    UploadMetadata,
};
pub use documents::{
    AssetRef, ContentReference, Preferences, ProfileRecord, ProfileUpdate, Theme, Tier,
    TradingStats, TradingStatsUpdate, TradingStatus,
};
pub use hash::{ContentHash, InvalidHash};
pub use identity::{Identity, InvalidIdentity};
