pub mod box_provider;
pub mod completion;
pub mod provider;
pub mod reasoning;
