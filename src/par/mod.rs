use std::str::FromStr;

pub mod par_rayon;
pub mod par_sequential;

/// How data-parallel steps of a build are distributed.
#[derive(PartialEq, Eq, Default, Clone, Copy, Debug)]
pub enum Scheduler {
    /// Everything runs on the calling thread.
    #[default]
    Sequential,
    /// Work is split across the global rayon pool. The call still blocks until done.
    Rayon,
}

impl FromStr for Scheduler {
    type Err = String;

    #[inline(always)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seq" => Ok(Self::Sequential),
            "rayon" => Ok(Self::Rayon),
            _ => Err(format!("Unknown mode: '{s}', valid modes: 'seq', 'rayon'")),
        }
    }
}

impl Scheduler {
    #[inline(always)]
    pub fn par_map<T, F>(self, data: &mut [T], func: &F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        match self {
            Scheduler::Sequential => par_sequential::par_map(data, func),
            Scheduler::Rayon => par_rayon::par_map(data, func),
        }
    }

    /// Calls `func(start_index, chunk)` for consecutive chunks of `chunk_size` elements.
    #[inline(always)]
    pub fn par_chunks<T, F>(self, data: &[T], func: &F, chunk_size: usize)
    where
        T: Send + Sync,
        F: Fn(usize, &[T]) + Send + Sync,
    {
        match self {
            Scheduler::Sequential => par_sequential::par_chunks(data, func, chunk_size),
            Scheduler::Rayon => par_rayon::par_chunks(data, func, chunk_size),
        }
    }

    pub fn current_num_threads(self) -> usize {
        match self {
            Scheduler::Sequential => 1,
            Scheduler::Rayon => rayon::current_num_threads(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn parses_cli_names() {
        assert_eq!("seq".parse::<Scheduler>(), Ok(Scheduler::Sequential));
        assert_eq!("rayon".parse::<Scheduler>(), Ok(Scheduler::Rayon));
        assert!("forte".parse::<Scheduler>().is_err());
    }

    #[test]
    fn schedulers_visit_every_element() {
        for scheduler in [Scheduler::Sequential, Scheduler::Rayon] {
            let mut data = vec![0usize; 1000];
            scheduler.par_map(&mut data, &|i, v| *v = i * 2);
            assert!(data.iter().enumerate().all(|(i, v)| *v == i * 2));

            let sum = AtomicUsize::new(0);
            scheduler.par_chunks(
                &data,
                &|start, chunk: &[usize]| {
                    assert_eq!(chunk[0], start * 2);
                    sum.fetch_add(chunk.iter().sum::<usize>(), Ordering::Relaxed);
                },
                64,
            );
            assert_eq!(sum.into_inner(), data.iter().sum::<usize>());
        }
    }
}
