//! Off-thread real-time analysis.
//!
//! An [AnalysisWorker] owns one [RealtimeDetector] on a dedicated thread. Commands go in over
//! one channel and results come back, in submission order, over another. Hosts should not
//! queue frames faster than they consume results: the detector's continuity state assumes
//! frames arrive in time order at the analysis rate.
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};

use crate::detector::mcleod::McLeodDetector;
use crate::detector::realtime::{DetectOptions, RealtimeConfig, RealtimeDetector};
use crate::detector::{PitchDetector, PitchEstimate};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Samples per frame for the default McLeod core.
    pub frame_size: usize,
    pub detector: RealtimeConfig,
    pub use_sequence_selection: bool,
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            frame_size: 2048,
            detector: RealtimeConfig::default(),
            use_sequence_selection: false,
            thread_name: "pitch-analysis".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Fix the sample rate. Only the first init takes effect.
    Init { sample_rate: u32 },
    Process {
        sequence: u64,
        frame: Vec<f32>,
        guide_frequency: Option<f32>,
    },
    /// Drop all continuity, e.g. after a seek.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerResult {
    pub sequence: u64,
    pub estimate: PitchEstimate,
}

pub struct AnalysisWorker {
    commands: Option<Sender<WorkerMessage>>,
    results: Receiver<WorkerResult>,
    handle: Option<JoinHandle<()>>,
    next_sequence: u64,
}

impl AnalysisWorker {
    /// Start a worker with a McLeod core of `config.frame_size` samples.
    pub fn spawn(config: WorkerConfig) -> Result<Self> {
        let core = McLeodDetector::new(config.frame_size);
        Self::spawn_with_core(config, core)
    }

    pub fn spawn_with_core<D>(config: WorkerConfig, core: D) -> Result<Self>
    where
        D: PitchDetector<f32> + Send + 'static,
    {
        let (command_tx, command_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let name = config.thread_name.clone();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(config, core, command_rx, result_tx))
            .map_err(Error::Spawn)?;

        Ok(AnalysisWorker {
            commands: Some(command_tx),
            results: result_rx,
            handle: Some(handle),
            next_sequence: 0,
        })
    }

    pub fn send(&self, message: WorkerMessage) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(Error::WorkerDisconnected)?
            .send(message)
            .map_err(|_| Error::WorkerDisconnected)
    }

    pub fn init(&self, sample_rate: u32) -> Result<()> {
        self.send(WorkerMessage::Init { sample_rate })
    }

    /// Queue a frame and return the sequence number its result will carry.
    pub fn process(&mut self, frame: Vec<f32>, guide_frequency: Option<f32>) -> Result<u64> {
        let sequence = self.next_sequence;
        self.send(WorkerMessage::Process {
            sequence,
            frame,
            guide_frequency,
        })?;
        self.next_sequence += 1;
        Ok(sequence)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(WorkerMessage::Reset)
    }

    pub fn results(&self) -> &Receiver<WorkerResult> {
        &self.results
    }

    /// Block until the next result arrives.
    pub fn recv(&self) -> Result<WorkerResult> {
        self.results.recv().map_err(|_| Error::WorkerDisconnected)
    }

    pub fn try_recv(&self) -> Option<WorkerResult> {
        self.results.try_recv().ok()
    }

    /// Close the command channel and wait for the thread to finish.
    pub fn shutdown(&mut self) {
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("analysis worker panicked");
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<D>(config: WorkerConfig, core: D, commands: Receiver<WorkerMessage>, results: Sender<WorkerResult>)
where
    D: PitchDetector<f32>,
{
    let mut detector = RealtimeDetector::with_core(core, config.detector);
    let mut sample_rate: Option<u32> = None;
    debug!("analysis worker started");

    for message in commands.iter() {
        match message {
            WorkerMessage::Init { sample_rate: rate } => match sample_rate {
                _ if rate == 0 => warn!("ignoring init with a zero sample rate"),
                None => {
                    debug!("analysis worker running at {} Hz", rate);
                    sample_rate = Some(rate);
                }
                Some(current) if current != rate => {
                    warn!("ignoring init at {} Hz, worker runs at {} Hz", rate, current)
                }
                Some(_) => {}
            },
            WorkerMessage::Process {
                sequence,
                frame,
                guide_frequency,
            } => {
                let estimate = match sample_rate {
                    Some(rate) => {
                        let options = DetectOptions {
                            use_sequence_selection: config.use_sequence_selection,
                            guide_frequency,
                            min_rms: None,
                        };
                        detector.analyze(&frame, rate, &options)
                    }
                    None => {
                        warn!("frame {} arrived before init", sequence);
                        PitchEstimate::UNVOICED
                    }
                };
                if results.send(WorkerResult { sequence, estimate }).is_err() {
                    break;
                }
            }
            WorkerMessage::Reset => {
                trace!("analysis worker reset");
                detector.reset();
            }
        }
    }
    debug!("analysis worker stopped");
}
