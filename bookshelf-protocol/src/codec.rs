//! Encoder and decoder for BKRP frames and messages.

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameFlags};
use crate::message::{Request, Response, StreamItem};
use bytes::BytesMut;

/// Encodes requests, responses and stream items into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request into a frame.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(request)?.encode()
    }

    /// Encodes a response into a frame.
    pub fn encode_response(response: &Response) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(response)?.encode()
    }

    /// Encodes one stream item into a `STREAM` frame.
    pub fn encode_stream_item(item: &StreamItem) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(item)?
            .with_flags(FrameFlags::new().with_stream())
            .encode()
    }

    /// Encodes the response that terminates a stream.
    pub fn encode_stream_end(response: &Response) -> Result<BytesMut, ProtocolError> {
        Frame::from_json(response)?
            .with_flags(FrameFlags::new().with_stream().with_end_stream())
            .encode()
    }
}

/// A message received by a client: either a response or a stream item.
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Item(StreamItem),
}

impl Message {
    /// Parses a frame payload, distinguishing responses from stream items by
    /// their `type` field.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(payload_str(frame)?)?;
        let msg_type = value["type"].as_str().unwrap_or("").to_string();
        match msg_type.as_str() {
            "response" => Ok(Message::Response(serde_json::from_value(value)?)),
            "item" => Ok(Message::Item(serde_json::from_value(value)?)),
            _ => Err(ProtocolError::UnknownMessageType(msg_type)),
        }
    }
}

/// Decodes frames into requests and responses.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next request from the buffer.
    pub fn decode_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => Ok(Some(serde_json::from_str(payload_str(&frame)?)?)),
            None => Ok(None),
        }
    }

    /// Attempts to decode the next response from the buffer.
    pub fn decode_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => Ok(Some(serde_json::from_str(payload_str(&frame)?)?)),
            None => Ok(None),
        }
    }

    /// Attempts to decode the next server message.
    pub fn decode_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => Ok(Some(Message::from_frame(&frame)?)),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_str(frame: &Frame) -> Result<&str, ProtocolError> {
    std::str::from_utf8(&frame.payload).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BookMessage, Operation, ResponseStatus};
    use serde_json::json;

    #[test]
    fn test_encoder_decoder_roundtrip() {
        let request = Request::new("42", Operation::DeleteBook)
            .with_params(json!({"value": "0441013597"}));
        let encoded = Encoder::encode_request(&request).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let decoded = decoder.decode_request().unwrap().unwrap();
        assert_eq!(decoded.id, "42");
        assert_eq!(decoded.op, Operation::DeleteBook);
        assert_eq!(decoded.params["value"], "0441013597");
    }

    #[test]
    fn test_partial_frame_decoding() {
        let request = Request::new("1", Operation::Ping);
        let encoded = Encoder::encode_request(&request).unwrap();

        let mut decoder = Decoder::new();

        decoder.extend(&encoded[..10]);
        assert!(decoder.decode_request().unwrap().is_none());

        decoder.extend(&encoded[10..]);
        let decoded = decoder.decode_request().unwrap().unwrap();
        assert_eq!(decoded.id, "1");
    }

    #[test]
    fn test_encode_response() {
        let response = Response::ok("req-1", json!({"pong": true}));
        let encoded = Encoder::encode_response(&response).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);
        let decoded = decoder.decode_response().unwrap().unwrap();

        assert_eq!(decoded.id, "req-1");
        assert_eq!(decoded.status, ResponseStatus::Ok);
    }

    #[test]
    fn test_decode_message_stream_sequence() {
        let book = BookMessage {
            title: Some("Elantris".to_string()),
            author: Some("Brandon Sanderson".to_string()),
            isbn: Some("0765311771".to_string()),
        };

        let mut decoder = Decoder::new();
        let item = StreamItem::new("9", 0, book.clone());
        decoder.extend(&Encoder::encode_stream_item(&item).unwrap());
        decoder.extend(
            &Encoder::encode_stream_end(&Response::ok("9", json!({"count": 1}))).unwrap(),
        );

        match decoder.decode_message().unwrap().unwrap() {
            Message::Item(item) => {
                assert_eq!(item.id, "9");
                assert_eq!(item.seq, 0);
                assert_eq!(item.book, book);
            }
            other => panic!("expected item, got {:?}", other),
        }

        match decoder.decode_message().unwrap().unwrap() {
            Message::Response(resp) => {
                assert_eq!(resp.id, "9");
                assert_eq!(resp.result.unwrap()["count"], 1);
            }
            other => panic!("expected response, got {:?}", other),
        }

        assert!(decoder.decode_message().unwrap().is_none());
    }

    #[test]
    fn test_decode_message_rejects_unknown_type() {
        let mut decoder = Decoder::new();
        decoder.extend(&Encoder::encode_request(&Request::new("1", Operation::Ping)).unwrap());
        assert!(matches!(
            decoder.decode_message(),
            Err(ProtocolError::UnknownMessageType(t)) if t == "request"
        ));
    }

    #[test]
    fn test_decoder_buffered() {
        let mut decoder = Decoder::default();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"some data");
        assert_eq!(decoder.buffered(), 9);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
