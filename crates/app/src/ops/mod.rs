pub mod device;
pub mod init;
pub mod key;
pub mod storage_password;
pub mod verify;
pub mod version;

pub use device::Device;
pub use init::Init;
pub use key::Key;
pub use storage_password::StoragePassword;
pub use verify::Verify;
pub use version::Version;
