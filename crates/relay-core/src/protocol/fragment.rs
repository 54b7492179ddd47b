//! Reassembly of fragmented data messages (RFC 6455 §5.4).
//!
//! One [`MessageAssembler`] lives with each connection.  Data frames are fed
//! in arrival order; control frames must be handled by the caller and never
//! reach the assembler.

use thiserror::Error;

use crate::protocol::frame::{Frame, Opcode};

/// Fragment sequencing violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    #[error("new {0:?} frame while a fragmented message is in progress")]
    InterleavedMessage(Opcode),

    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("{0:?} is not a data opcode")]
    NotData(Opcode),
}

/// A complete data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// [`Opcode::Text`] or [`Opcode::Binary`], taken from the first fragment.
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Partial {
    opcode: Opcode,
    payload: Vec<u8>,
}

/// Accumulates fragments until a frame with FIN=1 completes the message.
#[derive(Debug)]
pub struct MessageAssembler {
    max_message_size: usize,
    partial: Option<Partial>,
}

impl MessageAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            partial: None,
        }
    }

    /// Whether a fragmented message has been started but not finished.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Feeds one data frame.
    ///
    /// Returns `Ok(Some(message))` when `frame` completes a message and
    /// `Ok(None)` while more fragments are expected.
    ///
    /// # Errors
    ///
    /// Any [`AssemblyError`] discards the message in progress, so the next
    /// unfragmented frame starts cleanly.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, AssemblyError> {
        let result = self.accept(frame);
        if result.is_err() {
            self.partial = None;
        }
        result
    }

    fn accept(&mut self, frame: Frame) -> Result<Option<Message>, AssemblyError> {
        match (frame.opcode, self.partial.is_some()) {
            (Opcode::Text | Opcode::Binary, false) => {
                self.check_size(frame.payload.len())?;
                if frame.fin {
                    return Ok(Some(Message {
                        opcode: frame.opcode,
                        payload: frame.payload,
                    }));
                }
                self.partial = Some(Partial {
                    opcode: frame.opcode,
                    payload: frame.payload,
                });
                Ok(None)
            }
            (Opcode::Text | Opcode::Binary, true) => {
                Err(AssemblyError::InterleavedMessage(frame.opcode))
            }
            (Opcode::Continuation, false) => Err(AssemblyError::UnexpectedContinuation),
            (Opcode::Continuation, true) => {
                let max = self.max_message_size;
                let Some(partial) = self.partial.as_mut() else {
                    return Err(AssemblyError::UnexpectedContinuation);
                };
                let size = partial.payload.len() + frame.payload.len();
                if size > max {
                    return Err(AssemblyError::MessageTooLarge { size, max });
                }
                partial.payload.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(None);
                }
                Ok(self.partial.take().map(|p| Message {
                    opcode: p.opcode,
                    payload: p.payload,
                }))
            }
            (other, _) => Err(AssemblyError::NotData(other)),
        }
    }

    fn check_size(&self, size: usize) -> Result<(), AssemblyError> {
        if size > self.max_message_size {
            Err(AssemblyError::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }
}
