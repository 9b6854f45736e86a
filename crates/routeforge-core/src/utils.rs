use rayon::prelude::*;

/// Splits `data` into at most `nr_workers` chunks, maps each chunk on the
/// thread pool, and gathers the results through a channel. Workers merge
/// whole batches; there is no per-item synchronization.
pub(crate) fn par_chunks<T, F, R>(data: &[T], nr_workers: usize, f: F) -> impl Iterator<Item = R>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Vec<R> + Sync,
{
    let (s, r) = crossbeam_channel::unbounded();
    if !data.is_empty() {
        let nr_workers = nr_workers.clamp(1, num_cpus::get().max(1));
        let chunk_size = data.len().div_ceil(nr_workers);
        data.chunks(chunk_size)
            .par_bridge()
            .for_each_with(s, |s, chunk| {
                let v = f(chunk);
                s.send(v).unwrap(); // channel will not become disconnected
            });
    }
    r.into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_item() {
        let data = (0..1000).collect::<Vec<u32>>();
        let mut out = par_chunks(&data, 8, |chunk| chunk.to_vec()).collect::<Vec<_>>();
        out.sort_unstable();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let data: Vec<u32> = Vec::new();
        assert_eq!(par_chunks(&data, 4, |chunk| chunk.to_vec()).count(), 0);
    }

    #[test]
    fn single_worker_still_works() {
        let data = vec![1u32, 2, 3];
        let sum: u32 = par_chunks(&data, 1, |chunk| vec![chunk.iter().sum::<u32>()]).sum();
        assert_eq!(sum, 6);
    }
}
