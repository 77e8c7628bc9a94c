//! Data-parallel dispatch for the mask post-processing passes.
//!
//! A [`ComputeContext`] is created once and reused across predictions: it owns the worker pool
//! and the float scratch buffers sized for the working canvas. Passes that read one buffer and
//! write another are expressed through [`Dispatch`], which runs a closure for every pixel (or
//! every row) of the output either on a rayon pool or serially on the calling thread. Both
//! backends produce bit-identical results.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::{ComputeBackend, ComputeOptions};
use crate::error::{Error, Result};
use crate::space::Size;

/// Executes per-pixel and per-row passes over dense `f32` buffers.
pub enum Dispatch {
    Serial,
    Pool(ThreadPool),
}

impl Dispatch {
    pub fn new(options: &ComputeOptions) -> Result<Self> {
        match options.backend {
            ComputeBackend::Serial => Ok(Dispatch::Serial),
            ComputeBackend::Threads => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(options.threads)
                    .thread_name(|i| format!("handpose-compute-{i}"))
                    .build()
                    .map_err(|e| Error::ComputeUnavailable(e.to_string()))?;
                Ok(Dispatch::Pool(pool))
            }
        }
    }

    /// Number of workers passes are spread across.
    pub fn workers(&self) -> usize {
        match self {
            Dispatch::Serial => 1,
            Dispatch::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Sets every element of `out` to `op(index)`.
    pub fn per_pixel<F>(&self, out: &mut [f32], op: F)
    where
        F: Fn(usize) -> f32 + Sync + Send,
    {
        match self {
            Dispatch::Serial => out.iter_mut().enumerate().for_each(|(i, v)| *v = op(i)),
            Dispatch::Pool(pool) => pool.install(|| {
                out.par_iter_mut()
                    .enumerate()
                    .for_each(|(i, v)| *v = op(i))
            }),
        }
    }

    /// Replaces every element `v` of `buf` with `op(v)`.
    pub fn map_in_place<F>(&self, buf: &mut [f32], op: F)
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        match self {
            Dispatch::Serial => buf.iter_mut().for_each(|v| *v = op(*v)),
            Dispatch::Pool(pool) => pool.install(|| buf.par_iter_mut().for_each(|v| *v = op(*v))),
        }
    }

    /// Calls `op(y, row)` for every `width`-long row of `out`.
    pub fn per_row<F>(&self, out: &mut [f32], width: usize, op: F)
    where
        F: Fn(usize, &mut [f32]) + Sync + Send,
    {
        match self {
            Dispatch::Serial => out
                .chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| op(y, row)),
            Dispatch::Pool(pool) => pool.install(|| {
                out.par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(y, row)| op(y, row))
            }),
        }
    }

    /// Global minimum and maximum of `data`. NaNs are ignored.
    ///
    /// Returns `(INFINITY, NEG_INFINITY)` for an empty (or all-NaN) buffer.
    pub fn min_max(&self, data: &[f32]) -> (f32, f32) {
        let identity = (f32::INFINITY, f32::NEG_INFINITY);
        let fold = |(lo, hi): (f32, f32), v: f32| (lo.min(v), hi.max(v));
        let merge = |a: (f32, f32), b: (f32, f32)| (a.0.min(b.0), a.1.max(b.1));
        match self {
            Dispatch::Serial => data.iter().copied().fold(identity, fold),
            Dispatch::Pool(pool) => pool.install(|| {
                data.par_iter()
                    .copied()
                    .fold(|| identity, fold)
                    .reduce(|| identity, merge)
            }),
        }
    }

    /// Runs `iterations` passes of `step` strictly in order.
    ///
    /// Pixels inside one step may run in parallel, but step `k + 1` always observes the
    /// completed output of step `k`.
    pub fn iterate<F>(&self, iterations: u32, mut step: F)
    where
        F: FnMut(u32),
    {
        for k in 0..iterations {
            step(k);
        }
    }
}

// One canvas each, reused across predictions.
pub(crate) struct Scratch {
    pub(crate) background: Vec<f32>,
    pub(crate) foreground: Vec<f32>,
    // probability, then the binarized anchor
    pub(crate) anchor: Vec<f32>,
    pub(crate) current: Vec<f32>,
    pub(crate) rows: Vec<f32>,
    pub(crate) dilated: Vec<f32>,
}

impl Scratch {
    fn new(len: usize) -> Self {
        Self {
            background: vec![0.0; len],
            foreground: vec![0.0; len],
            anchor: vec![0.0; len],
            current: vec![0.0; len],
            rows: vec![0.0; len],
            dilated: vec![0.0; len],
        }
    }
}

/// Long-lived compute state: dispatcher plus scratch buffers for one canvas size.
///
/// Mask computation takes the context by `&mut`, so a context can only serve one prediction at a
/// time. Create one context per concurrent caller.
pub struct ComputeContext {
    pub(crate) dispatch: Dispatch,
    pub(crate) scratch: Scratch,
    canvas: Size,
}

impl ComputeContext {
    pub fn new(canvas: Size, options: &ComputeOptions) -> Result<Self> {
        canvas.ensure_non_empty("compute canvas")?;
        let dispatch = Dispatch::new(options)?;
        log::debug!(
            "compute context ready: {canvas} canvas, {} worker(s)",
            dispatch.workers()
        );
        Ok(Self {
            dispatch,
            scratch: Scratch::new(canvas.area()),
            canvas,
        })
    }

    /// Canvas size the scratch buffers were allocated for.
    pub fn canvas(&self) -> Size {
        self.canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(threads: usize) -> Dispatch {
        Dispatch::new(&ComputeOptions {
            backend: ComputeBackend::Threads,
            threads,
        })
        .unwrap()
    }

    #[test]
    fn serial_and_pool_min_max_agree() {
        let data: Vec<f32> = (0..10_000).map(|i| ((i * 7919) % 1000) as f32 - 300.5).collect();
        let serial = Dispatch::Serial.min_max(&data);
        let parallel = pool(4).min_max(&data);
        assert_eq!(serial, parallel);
        assert_eq!(serial, (-300.5, 698.5));
    }

    #[test]
    fn min_max_skips_nan() {
        let data = [f32::NAN, 2.0, -1.0, f32::NAN];
        assert_eq!(Dispatch::Serial.min_max(&data), (-1.0, 2.0));
    }

    #[test]
    fn per_row_sees_row_index() {
        let mut out = vec![0.0; 12];
        pool(2).per_row(&mut out, 4, |y, row| row.fill(y as f32));
        assert_eq!(
            out,
            [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]
        );
    }

    #[test]
    fn per_pixel_and_map_in_place() {
        let mut out = vec![0.0; 8];
        let d = pool(3);
        d.per_pixel(&mut out, |i| i as f32);
        d.map_in_place(&mut out, |v| v * 2.0);
        assert_eq!(out, [0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0]);
    }

    #[test]
    fn iterations_run_in_order() {
        let mut seen = Vec::new();
        Dispatch::Serial.iterate(5, |k| seen.push(k));
        assert_eq!(seen, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn context_rejects_empty_canvas() {
        assert!(ComputeContext::new(Size::new(0, 240), &ComputeOptions::serial()).is_err());
    }
}
