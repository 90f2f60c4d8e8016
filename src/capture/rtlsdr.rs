//! RTL2832U dongle source (requires the `rtlsdr` feature).
//!
//! `rtlsdr_mt` splits the device into a controller and a reader, which lets
//! the shutdown path call `cancel_async_read` while the capture thread sits
//! inside `read_async`.

use std::sync::{Arc, Mutex, PoisonError};

use crate::capture::source::{CancelHandle, IqSource};
use crate::config::{nearest_gain, DeviceConfig};
use crate::error::SourceError;

/// Number of USB transfer buffers queued by the driver (0 lets librtlsdr pick).
const BUF_NUM: u32 = 0;

struct ControllerHandle(Mutex<rtlsdr_mt::Controller>);

impl CancelHandle for ControllerHandle {
    fn cancel(&self) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_async_read();
    }
}

pub struct RtlSdrSource {
    reader: rtlsdr_mt::Reader,
    control: Arc<ControllerHandle>,
    index: u32,
    buf_len: u32,
}

impl RtlSdrSource {
    /// Open and configure the device. The endpoint buffer is reset last, right
    /// before streaming may start.
    pub fn open(config: &DeviceConfig, buf_len: usize) -> Result<Self, SourceError> {
        let (mut ctl, reader) = rtlsdr_mt::open(config.index).map_err(|e| {
            SourceError::device(format!("failed to open rtlsdr device #{}: {:?}", config.index, e))
        })?;

        ctl.set_sample_rate(config.sample_rate)
            .map_err(|e| SourceError::device(format!("set_sample_rate failed: {:?}", e)))?;
        log::info!("sampling at {} S/s", config.sample_rate);

        ctl.set_center_freq(config.center_freq)
            .map_err(|e| SourceError::device(format!("set_center_freq failed: {:?}", e)))?;
        log::info!("tuned to {} Hz", config.center_freq);

        if config.gain_db == 0.0 {
            ctl.enable_agc()
                .map_err(|e| SourceError::device(format!("enable_agc failed: {:?}", e)))?;
            log::info!("tuner gain set to automatic");
        } else {
            let mut gains = [0i32; 32];
            let available = ctl.tuner_gains(&mut gains).to_vec();
            let target = (config.gain_db * 10.0).round() as i32;
            let gain = nearest_gain(&available, target).unwrap_or(target);
            ctl.disable_agc()
                .map_err(|e| SourceError::device(format!("disable_agc failed: {:?}", e)))?;
            ctl.set_tuner_gain(gain)
                .map_err(|e| SourceError::device(format!("set_tuner_gain failed: {:?}", e)))?;
            log::info!("tuner gain set to {:.1} dB", gain as f32 / 10.0);
        }

        if config.ppm != 0 {
            ctl.set_ppm(config.ppm)
                .map_err(|e| SourceError::device(format!("set_ppm failed: {:?}", e)))?;
            log::info!("frequency correction set to {} ppm", config.ppm);
        }

        ctl.reset_buffer()
            .map_err(|e| SourceError::device(format!("reset_buffer failed: {:?}", e)))?;

        Ok(Self {
            reader,
            control: Arc::new(ControllerHandle(Mutex::new(ctl))),
            index: config.index,
            buf_len: buf_len as u32,
        })
    }
}

impl IqSource for RtlSdrSource {
    fn describe(&self) -> String {
        format!("rtlsdr device #{} ({} byte transfers)", self.index, self.buf_len)
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        self.control.clone()
    }

    fn read_async(&mut self, on_samples: &mut dyn FnMut(&[u8])) -> Result<(), SourceError> {
        self.reader
            .read_async(BUF_NUM, self.buf_len, |buf: &[u8]| on_samples(buf))
            .map_err(|e| SourceError::device(format!("read_async failed: {:?}", e)))
    }
}
