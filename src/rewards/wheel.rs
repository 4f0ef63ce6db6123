use rand::{seq::SliceRandom, Rng};

pub struct SpinWheel<'a> {
    prizes: &'a [i64],
}

impl<'a> SpinWheel<'a> {
    pub fn new(prizes: &'a [i64]) -> Self {
        Self { prizes }
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i64> {
        self.prizes.choose(rng).copied()
    }
}
