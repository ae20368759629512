mod bloom;

pub use bloom::BloomExistenceFilter;
