mod backend;
mod faulty;

pub use backend::TestBackend;
pub use faulty::FaultyStore;
