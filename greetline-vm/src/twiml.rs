//! TwiML response builder
//!
//! Handlers accumulate an ordered list of [`Instruction`]s; serialization to
//! TwiML XML happens only when the response leaves the service, so the call
//! and SMS logic can be tested against the instruction sequence directly.

use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum TwimlError {
    #[error("TwiML write failed: {0}")]
    Write(String),

    #[error("TwiML output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// One voice or messaging verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Forward the call, giving up after `timeout_secs` of ringing
    Dial { number: String, timeout_secs: u32 },
    /// Speak text
    Say(String),
    /// Play audio from a URL
    Play(String),
    Pause { length_secs: u32 },
    /// Record the caller (voicemail)
    Record,
    /// Continue the call at another webhook
    Redirect { url: String },
    /// Collect key presses, posting them to `action`
    Gather {
        num_digits: u32,
        action: String,
        children: Vec<Instruction>,
    },
    /// Reply to an inbound SMS
    Message(String),
    Hangup,
}

/// Ordered sequence of instructions returned to the telephony provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwimlResponse {
    instructions: Vec<Instruction>,
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    pub fn dial(&mut self, number: impl Into<String>, timeout_secs: u32) -> &mut Self {
        self.push(Instruction::Dial {
            number: number.into(),
            timeout_secs,
        })
    }

    pub fn say(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Instruction::Say(text.into()))
    }

    pub fn play(&mut self, url: impl Into<String>) -> &mut Self {
        self.push(Instruction::Play(url.into()))
    }

    pub fn pause(&mut self) -> &mut Self {
        self.push(Instruction::Pause { length_secs: 1 })
    }

    pub fn record(&mut self) -> &mut Self {
        self.push(Instruction::Record)
    }

    pub fn redirect(&mut self, url: impl Into<String>) -> &mut Self {
        self.push(Instruction::Redirect { url: url.into() })
    }

    pub fn message(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Instruction::Message(text.into()))
    }

    pub fn hangup(&mut self) -> &mut Self {
        self.push(Instruction::Hangup)
    }

    /// Add a `<Gather>` whose nested prompts are built by `build`
    pub fn gather<F>(&mut self, num_digits: u32, action: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut TwimlResponse),
    {
        let mut nested = TwimlResponse::new();
        build(&mut nested);
        self.push(Instruction::Gather {
            num_digits,
            action: action.into(),
            children: nested.instructions,
        })
    }

    /// Play the message if it is a URI, otherwise speak it
    pub fn say_or_play(&mut self, message: &str) -> &mut Self {
        if is_audio_uri(message) {
            self.play(message)
        } else {
            self.say(message)
        }
    }

    /// Serialize to a TwiML document
    pub fn to_xml(&self) -> Result<String, TwimlError> {
        let mut writer = Writer::new(Vec::new());
        write_document(&mut writer, &self.instructions)
            .map_err(|e| TwimlError::Write(e.to_string()))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

impl IntoResponse for TwimlResponse {
    fn into_response(self) -> Response {
        match self.to_xml() {
            Ok(xml) => ([(CONTENT_TYPE, "application/xml")], xml).into_response(),
            Err(e) => {
                error!(error = %e, "Failed to serialize TwiML response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Whether a configured message names playable audio rather than text to speak
pub fn is_audio_uri(message: &str) -> bool {
    !message.is_empty()
        && !message.chars().any(char::is_whitespace)
        && url::Url::parse(message).is_ok()
}

type WriteResult = Result<(), Box<dyn std::error::Error>>;

fn write_document(writer: &mut Writer<Vec<u8>>, instructions: &[Instruction]) -> WriteResult {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("Response")))?;
    for instruction in instructions {
        write_instruction(writer, instruction)?;
    }
    writer.write_event(Event::End(BytesEnd::new("Response")))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    text: &str,
) -> WriteResult {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

fn write_instruction(writer: &mut Writer<Vec<u8>>, instruction: &Instruction) -> WriteResult {
    match instruction {
        Instruction::Dial { number, timeout_secs } => {
            let timeout = timeout_secs.to_string();
            let start = BytesStart::new("Dial").with_attributes([("timeout", timeout.as_str())]);
            write_text_element(writer, start, number)?;
        }
        Instruction::Say(text) => {
            write_text_element(writer, BytesStart::new("Say"), text)?;
        }
        Instruction::Play(url) => {
            write_text_element(writer, BytesStart::new("Play"), url)?;
        }
        Instruction::Pause { length_secs } => {
            let length = length_secs.to_string();
            let elem = BytesStart::new("Pause").with_attributes([("length", length.as_str())]);
            writer.write_event(Event::Empty(elem))?;
        }
        Instruction::Record => {
            writer.write_event(Event::Empty(BytesStart::new("Record")))?;
        }
        Instruction::Redirect { url } => {
            let start = BytesStart::new("Redirect").with_attributes([("method", "POST")]);
            write_text_element(writer, start, url)?;
        }
        Instruction::Gather {
            num_digits,
            action,
            children,
        } => {
            let digits = num_digits.to_string();
            let start = BytesStart::new("Gather").with_attributes([
                ("numDigits", digits.as_str()),
                ("action", action.as_str()),
                ("method", "POST"),
            ]);
            writer.write_event(Event::Start(start))?;
            for child in children {
                write_instruction(writer, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new("Gather")))?;
        }
        Instruction::Message(text) => {
            write_text_element(writer, BytesStart::new("Message"), text)?;
        }
        Instruction::Hangup => {
            writer.write_event(Event::Empty(BytesStart::new("Hangup")))?;
        }
    }
    Ok(())
}
