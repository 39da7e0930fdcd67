//! The narrow contract this crate requires of a kernel-bypass NIC driver
//! library, plus an in-memory test double implementing it.
//!
//! Grounded method-for-method on
//! `examples/original_source/src/dpdk/dpdk_wrapper.py`'s ctypes bindings.
//! No DPDK-binding crate is fabricated: a real implementation of
//! [`DriverAdapter`] plugs into [`crate::capture::CaptureLoop`] without
//! that loop (or the flow table, or the publisher) changing at all.

use std::collections::VecDeque;

use crate::error::CaptureError;

/// Opaque handle to one received buffer. The driver adapter is solely
/// responsible for its lifetime; the capture loop only ever reads its
/// data and releases it exactly once.
pub type BufferHandle = u64;

/// The contract a kernel-bypass driver binding must satisfy.
pub trait DriverAdapter {
    /// Initialize the driver's runtime environment with EAL-style
    /// arguments (application name, core list, memory channels, hugepage
    /// directory, process type). Returns the number of arguments the
    /// driver consumed.
    fn init_env(&mut self, args: &[&str]) -> Result<usize, CaptureError>;

    /// Number of usable Ethernet ports detected after `init_env`.
    fn port_count(&self) -> Result<u16, CaptureError>;

    /// Allocate a buffer pool sized for `n` buffers of `data_room_size`
    /// bytes each, with `cache_size` per-core cache entries, on `numa_socket`.
    fn create_buffer_pool(
        &mut self,
        name: &str,
        n: u32,
        cache_size: u32,
        data_room_size: u32,
        numa_socket: u32,
    ) -> Result<(), CaptureError>;

    /// Configure `port` with `n_rx_queues`/`n_tx_queues`.
    fn configure_port(
        &mut self,
        port: u16,
        n_rx_queues: u16,
        n_tx_queues: u16,
    ) -> Result<(), CaptureError>;

    fn setup_rx_queue(
        &mut self,
        port: u16,
        queue: u16,
        depth: u32,
        numa_socket: u32,
    ) -> Result<(), CaptureError>;

    fn setup_tx_queue(&mut self, port: u16, queue: u16, depth: u32) -> Result<(), CaptureError>;

    fn start_port(&mut self, port: u16) -> Result<(), CaptureError>;

    /// Pull up to `max` received buffers from `(port, queue)` without
    /// blocking. An empty result means no packets were waiting.
    fn rx_burst(&mut self, port: u16, queue: u16, max: usize) -> Vec<BufferHandle>;

    /// Borrow the received bytes for `handle`. Valid until [`Self::free_buffer`]
    /// is called with the same handle.
    fn buffer_data(&self, handle: BufferHandle) -> &[u8];

    /// Release a buffer back to the pool. Must be called exactly once per
    /// handle returned by [`Self::rx_burst`], on every code path.
    fn free_buffer(&mut self, handle: BufferHandle);
}

/// Deterministic in-memory driver double: frames are pre-loaded and handed
/// out one `rx_burst` at a time, `burst_size` at most per call. Used by the
/// test suite and by `benches/hot_path_bench.rs`.
#[derive(Debug, Default)]
pub struct MockDriverAdapter {
    pending: VecDeque<Vec<u8>>,
    outstanding: std::collections::HashMap<BufferHandle, Vec<u8>>,
    next_handle: BufferHandle,
    initialized: bool,
    freed_count: u64,
}

impl MockDriverAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be returned by a future `rx_burst`.
    pub fn push_frame(&mut self, frame: Vec<u8>) {
        self.pending.push_back(frame);
    }

    pub fn frames_remaining(&self) -> usize {
        self.pending.len()
    }

    /// Number of buffers released via `free_buffer` so far; used by tests
    /// to assert the "release on every path" invariant.
    pub fn freed_count(&self) -> u64 {
        self.freed_count
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}

impl DriverAdapter for MockDriverAdapter {
    fn init_env(&mut self, args: &[&str]) -> Result<usize, CaptureError> {
        self.initialized = true;
        Ok(args.len())
    }

    fn port_count(&self) -> Result<u16, CaptureError> {
        if !self.initialized {
            return Err(CaptureError::EnvInit("not initialized".to_string()));
        }
        Ok(1)
    }

    fn create_buffer_pool(
        &mut self,
        _name: &str,
        _n: u32,
        _cache_size: u32,
        _data_room_size: u32,
        _numa_socket: u32,
    ) -> Result<(), CaptureError> {
        Ok(())
    }

    fn configure_port(
        &mut self,
        _port: u16,
        _n_rx_queues: u16,
        _n_tx_queues: u16,
    ) -> Result<(), CaptureError> {
        Ok(())
    }

    fn setup_rx_queue(
        &mut self,
        _port: u16,
        _queue: u16,
        _depth: u32,
        _numa_socket: u32,
    ) -> Result<(), CaptureError> {
        Ok(())
    }

    fn setup_tx_queue(&mut self, _port: u16, _queue: u16, _depth: u32) -> Result<(), CaptureError> {
        Ok(())
    }

    fn start_port(&mut self, _port: u16) -> Result<(), CaptureError> {
        Ok(())
    }

    fn rx_burst(&mut self, _port: u16, _queue: u16, max: usize) -> Vec<BufferHandle> {
        let mut handles = Vec::new();
        for _ in 0..max {
            let Some(frame) = self.pending.pop_front() else {
                break;
            };
            let handle = self.next_handle;
            self.next_handle += 1;
            self.outstanding.insert(handle, frame);
            handles.push(handle);
        }
        handles
    }

    fn buffer_data(&self, handle: BufferHandle) -> &[u8] {
        self.outstanding
            .get(&handle)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn free_buffer(&mut self, handle: BufferHandle) {
        if self.outstanding.remove(&handle).is_some() {
            self.freed_count += 1;
        }
    }
}
