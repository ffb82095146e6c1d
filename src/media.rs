//! Local handling of media streams for the console client
//!
//! Received video frames are written to disk, received audio is appended
//! to a raw PCM capture file, and a sine tone stands in for a microphone.

use std::f32::consts::TAU;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// File name of the most recent video frame
pub const LATEST_FRAME_FILE: &str = "latest.jpg";

/// Peak amplitude of the generated test tone
pub const TONE_AMPLITUDE: f32 = 0.5;

/// Frequency of the generated test tone
pub const TONE_FREQUENCY_HZ: f32 = 440.0;

/// Writes each received frame over the previous one
#[derive(Debug)]
pub struct FrameSink {
    dir: PathBuf,
    saved: u64,
}

impl FrameSink {
    /// Create the sink, making the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::IoWrite {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir, saved: 0 })
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FRAME_FILE)
    }

    /// Replace the latest frame; readers never observe a partial file
    pub fn save(&mut self, frame: &[u8]) -> Result<PathBuf> {
        let target = self.latest_path();
        let staging = self.dir.join(format!(".{}.tmp", LATEST_FRAME_FILE));

        fs::write(&staging, frame).map_err(|e| Error::IoWrite {
            path: staging.clone(),
            source: e,
        })?;
        fs::rename(&staging, &target).map_err(|e| Error::IoWrite {
            path: target.clone(),
            source: e,
        })?;

        self.saved += 1;
        Ok(target)
    }

    pub fn frames_saved(&self) -> u64 {
        self.saved
    }
}

/// Appends received PCM payloads to one file
#[derive(Debug)]
pub struct AudioCapture {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl AudioCapture {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::IoWrite {
                path: path.clone(),
                source: e,
            })?;

        debug!(path = %path.display(), "Audio capture opened");
        Ok(Self {
            path,
            file,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, pcm: &[u8]) -> Result<()> {
        self.file.write_all(pcm).map_err(|e| Error::IoWrite {
            path: self.path.clone(),
            source: e,
        })?;
        self.bytes_written += pcm.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Mono sine wave in `[-amplitude, amplitude]`
pub fn sine_tone(frequency_hz: f32, sample_rate: u32, duration: Duration, amplitude: f32) -> Vec<f32> {
    let total = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
    let step = TAU * frequency_hz / sample_rate as f32;
    (0..total)
        .map(|n| amplitude * (step * n as f32).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_frame_sink_overwrites_latest() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = FrameSink::new(temp_dir.path().join("frames")).unwrap();

        sink.save(&[0xFF, 0xD8, 0x01]).unwrap();
        let path = sink.save(&[0xFF, 0xD8, 0x02]).unwrap();

        assert_eq!(path, temp_dir.path().join("frames").join("latest.jpg"));
        assert_eq!(fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0x02]);
        assert_eq!(sink.frames_saved(), 2);
    }

    #[test]
    fn test_audio_capture_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("capture").join("audio.pcm");

        let mut capture = AudioCapture::open(&path).unwrap();
        capture.append(&[1, 0, 2, 0]).unwrap();
        capture.append(&[3, 0]).unwrap();
        assert_eq!(capture.bytes_written(), 6);
        drop(capture);

        // Reopening continues where the previous run stopped
        let mut capture = AudioCapture::open(&path).unwrap();
        capture.append(&[4, 0]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 0, 2, 0, 3, 0, 4, 0]);
    }

    #[test]
    fn test_sine_tone_shape() {
        let tone = sine_tone(440.0, 16000, Duration::from_millis(500), 0.5);
        assert_eq!(tone.len(), 8000);
        assert_eq!(tone[0], 0.0);
        assert!(tone.iter().all(|s| s.abs() <= 0.5 + f32::EPSILON));
        assert!(tone.iter().any(|s| *s > 0.45));
    }

    #[test]
    fn test_sine_tone_empty() {
        assert!(sine_tone(440.0, 16000, Duration::ZERO, 0.5).is_empty());
    }
}
