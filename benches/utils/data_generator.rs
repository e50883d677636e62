use lumbung::types::{
    rid::Rid,
    row::Row,
    value::{Point, Value},
};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

pub struct DataGenerator {
    rng: StdRng,
}

impl DataGenerator {
    pub fn new() -> Self {
        Self::with_seed(42)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Integer keys `0..count` in random order, each with a distinct locator.
    pub fn shuffled_keys(&mut self, count: usize) -> Vec<(Value, Rid)> {
        let mut keys: Vec<i64> = (0..count as i64).collect();
        keys.shuffle(&mut self.rng);
        keys.into_iter()
            .enumerate()
            .map(|(i, k)| (Value::Integer(k), Rid::new((i / 64) as u32, (i % 64) as u32)))
            .collect()
    }

    pub fn points(&mut self, count: usize, extent: f64) -> Vec<(Value, Rid)> {
        (0..count)
            .map(|i| {
                let point = Point::new(
                    self.rng.random_range(0.0..extent),
                    self.rng.random_range(0.0..extent),
                );
                (Value::Point(point), Rid::new((i / 64) as u32, (i % 64) as u32))
            })
            .collect()
    }

    pub fn probe(&mut self, count: usize) -> Value {
        Value::Integer(self.rng.random_range(0..count as i64))
    }

    pub fn reading_row(&mut self, id: i64) -> Row {
        Row::new(vec![
            Value::Integer(id),
            Value::Real(self.rng.random_range(-40.0..60.0)),
            Value::Point(Point::new(
                self.rng.random_range(0.0..1000.0),
                self.rng.random_range(0.0..1000.0),
            )),
        ])
    }
}
