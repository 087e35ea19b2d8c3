//! Transcription on a background thread.
use std::panic;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use log::debug;

use crate::error::{Error, Result};
use crate::transcribe::{AudioBuffer, CancelToken, MelodyTranscriber, TranscribeOptions, Transcription};

/// Handle to a running transcription.
pub struct TranscriptionJob {
    progress: Receiver<f32>,
    cancel: CancelToken,
    handle: JoinHandle<Result<Transcription>>,
}

/// Start transcribing `audio` on its own thread. Progress percentages arrive on
/// [TranscriptionJob::progress]; the channel disconnects when the job ends.
pub fn spawn_transcription(audio: AudioBuffer, options: TranscribeOptions) -> Result<TranscriptionJob> {
    let (sender, receiver) = unbounded();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let handle = thread::Builder::new()
        .name("transcription".to_string())
        .spawn(move || {
            debug!("transcription job started");
            MelodyTranscriber::new(options).transcribe_with_cancel(&audio, &token, |percent| {
                // The caller may have stopped listening.
                let _ = sender.send(percent);
            })
        })
        .map_err(Error::Spawn)?;

    Ok(TranscriptionJob {
        progress: receiver,
        cancel,
        handle,
    })
}

impl TranscriptionJob {
    pub fn progress(&self) -> &Receiver<f32> {
        &self.progress
    }

    /// Ask the job to stop at its next yield point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result. A panic on the job thread is resumed here.
    pub fn join(self) -> Result<Transcription> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
