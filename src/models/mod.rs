pub mod install_record;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::install_record::{self, Entity as InstallRecordEntity};
}
