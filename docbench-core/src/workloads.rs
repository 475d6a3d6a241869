//! Concrete operations driven through the [`Harness`](crate::runner::Harness).

pub mod flood;
pub mod lookup;
pub mod mixed;
pub mod seeder;

pub use flood::{FloodOptions, InsertFlood};
pub use lookup::{ContentGenerator, LookupOptions, LookupReport, PointLookup, lookup};
pub use mixed::{MixedOptions, MixedReport, MixedWrite, TargetReport, mixed};
pub use seeder::{
    BulkSeeder, ItemGenerator, RecordGenerator, SeedOptions, SeedReport, batch_count,
    batch_range, batch_ranges, seed,
};
