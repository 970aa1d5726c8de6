// src/core/protocol.rs

//! Minimal datagram-protocol primitives (spec §6): just enough of RFC 7252
//! (CoAP) and RFC 7959 (block-wise transfer) to drive the Arbiter and
//! Observer correctly — a message header (type, method/response code,
//! message ID, token), a Block1/Block2 option pair, and an Observe option.
//! This is not a general CoAP implementation, only the subset this
//! Service's contract needs; the physical framing (UDP socket, retransmit
//! timers for confirmable messages) is out of scope and left to the
//! transport the binary wires up in `server::connection_loop`.

use std::fmt;

use crate::core::errors::{ServiceError, StatusCode};

/// The three-bit message type of RFC 7252 §3, minus the two ACK/RST
/// variants this Service's UDP loop folds into the same response path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

/// A request method (spec §4.A routes GET/POST/DELETE to typed handlers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// The response status codes fixed by spec §6, carried at the protocol
/// layer so a response message can be built directly from a
/// `core::errors::StatusCode` without the dispatcher knowing wire details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Content,
    Changed,
    Deleted,
    BadRequest,
    NotFound,
    NotImplemented,
    ServiceUnavailable,
    NotAcceptable,
    InternalServerError,
    /// RFC 7959 §2.3's 2.31 Continue: acknowledges a non-final Block1
    /// chunk. Never produced by a handler — only by the Arbiter's
    /// transport-facing caller, for a block still mid-reassembly.
    Continue,
}

impl From<StatusCode> for ResponseCode {
    fn from(s: StatusCode) -> Self {
        match s {
            StatusCode::Content => ResponseCode::Content,
            StatusCode::Changed => ResponseCode::Changed,
            StatusCode::Deleted => ResponseCode::Deleted,
            StatusCode::BadRequest => ResponseCode::BadRequest,
            StatusCode::NotFound => ResponseCode::NotFound,
            StatusCode::NotImplemented => ResponseCode::NotImplemented,
            StatusCode::ServiceUnavailable => ResponseCode::ServiceUnavailable,
            StatusCode::NotAcceptable => ResponseCode::NotAcceptable,
            StatusCode::InternalServerError => ResponseCode::InternalServerError,
        }
    }
}

/// A Block1 (request payload) / Block2 (response payload) option, RFC 7959
/// §2.2: a zero-based block number, a power-of-two size exponent (actual
/// size is `2^(4+size_exponent)` bytes), and a more-blocks flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    pub number: u32,
    pub size_exponent: u8,
    pub more: bool,
}

impl BlockOption {
    pub fn block_size(&self) -> usize {
        1usize << (4 + self.size_exponent as u32)
    }
}

/// The JSON media type is the only one this Service ever serves (spec
/// §4.A "Content negotiation"). Any other requested type is rejected with
/// `not_acceptable`.
pub const ACCEPTED_CONTENT_TYPE: &str = "application/json";

/// A decoded request, already past header/option parsing. `uri_path` and
/// `query` are the parsed URI components the dispatcher routes on.
#[derive(Debug, Clone)]
pub struct Request {
    pub kind: MessageKind,
    pub method: Method,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub uri_path: String,
    pub query: Vec<(String, String)>,
    pub accept: Option<String>,
    pub observe_register: bool,
    pub block1: Option<BlockOption>,
    pub payload: Vec<u8>,
}

/// A response the dispatcher hands back to the transport loop for
/// encoding. `observe_sequence` is set only on a response to an
/// observe-registering GET on an observable resource (spec §4.F).
#[derive(Debug, Clone)]
pub struct Response {
    // see field docs below; Clone is required so the Arbiter's replay cache
    // (spec §4.B "Idempotence") can hand back a copy of a prior response.
    pub code: ResponseCode,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub observe_sequence: Option<u32>,
}

impl Response {
    pub fn empty(code: ResponseCode, message_id: u16, token: Vec<u8>) -> Self {
        Self {
            code,
            message_id,
            token,
            content_type: ACCEPTED_CONTENT_TYPE,
            body: Vec::new(),
            observe_sequence: None,
        }
    }

    pub fn json(code: ResponseCode, message_id: u16, token: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            code,
            message_id,
            token,
            content_type: ACCEPTED_CONTENT_TYPE,
            body,
            observe_sequence: None,
        }
    }
}

/// An asynchronous push to a resource's observers (spec §4.F), carried
/// out-of-band from the request/response cycle over the same transport's
/// observe extension.
#[derive(Debug, Clone)]
pub struct Notification {
    pub uri_path: &'static str,
    pub sequence: u32,
    pub body: Vec<u8>,
}

/// A small cursor over a byte slice, used by `Request::decode`/
/// `Response::decode` to pull fixed-width fields off the front without a
/// crate dependency this hand-rolled wire format has no other use for.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ServiceError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ServiceError::BadRequest("truncated message".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ServiceError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ServiceError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ServiceError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes_of_len(&mut self, len: usize) -> Result<Vec<u8>, ServiceError> {
        Ok(self.take(len)?.to_vec())
    }

    fn string_of_len(&mut self, len: usize) -> Result<String, ServiceError> {
        String::from_utf8(self.bytes_of_len(len)?)
            .map_err(|e| ServiceError::BadRequest(format!("malformed UTF-8: {e}")))
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

fn kind_to_byte(kind: MessageKind) -> u8 {
    match kind {
        MessageKind::Confirmable => 0,
        MessageKind::NonConfirmable => 1,
        MessageKind::Acknowledgement => 2,
        MessageKind::Reset => 3,
    }
}

fn byte_to_kind(b: u8) -> Result<MessageKind, ServiceError> {
    match b {
        0 => Ok(MessageKind::Confirmable),
        1 => Ok(MessageKind::NonConfirmable),
        2 => Ok(MessageKind::Acknowledgement),
        3 => Ok(MessageKind::Reset),
        other => Err(ServiceError::BadRequest(format!(
            "unknown message kind byte {other}"
        ))),
    }
}

fn method_to_byte(method: Method) -> u8 {
    match method {
        Method::Get => 0,
        Method::Post => 1,
        Method::Delete => 2,
    }
}

fn byte_to_method(b: u8) -> Result<Method, ServiceError> {
    match b {
        0 => Ok(Method::Get),
        1 => Ok(Method::Post),
        2 => Ok(Method::Delete),
        other => Err(ServiceError::BadRequest(format!(
            "unknown method byte {other}"
        ))),
    }
}

fn code_to_byte(code: ResponseCode) -> u8 {
    match code {
        ResponseCode::Content => 0,
        ResponseCode::Changed => 1,
        ResponseCode::Deleted => 2,
        ResponseCode::BadRequest => 3,
        ResponseCode::NotFound => 4,
        ResponseCode::NotImplemented => 5,
        ResponseCode::ServiceUnavailable => 6,
        ResponseCode::NotAcceptable => 7,
        ResponseCode::InternalServerError => 8,
        ResponseCode::Continue => 9,
    }
}

fn byte_to_code(b: u8) -> Result<ResponseCode, ServiceError> {
    match b {
        0 => Ok(ResponseCode::Content),
        1 => Ok(ResponseCode::Changed),
        2 => Ok(ResponseCode::Deleted),
        3 => Ok(ResponseCode::BadRequest),
        4 => Ok(ResponseCode::NotFound),
        5 => Ok(ResponseCode::NotImplemented),
        6 => Ok(ResponseCode::ServiceUnavailable),
        7 => Ok(ResponseCode::NotAcceptable),
        8 => Ok(ResponseCode::InternalServerError),
        9 => Ok(ResponseCode::Continue),
        other => Err(ServiceError::BadRequest(format!(
            "unknown response code byte {other}"
        ))),
    }
}

const FLAG_ACCEPT_PRESENT: u8 = 0b001;
const FLAG_OBSERVE_REGISTER: u8 = 0b010;
const FLAG_BLOCK1_PRESENT: u8 = 0b100;

impl Request {
    /// Encodes a request to this Service's hand-rolled wire format (not
    /// RFC 7252 bit-for-bit — see module docs). Used by tests and by any
    /// future client harness; the server side only ever decodes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(kind_to_byte(self.kind));
        out.push(method_to_byte(self.method));
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.push(self.token.len() as u8);
        out.extend_from_slice(&self.token);
        out.extend_from_slice(&(self.uri_path.len() as u16).to_be_bytes());
        out.extend_from_slice(self.uri_path.as_bytes());
        let query_str = self
            .query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        out.extend_from_slice(&(query_str.len() as u16).to_be_bytes());
        out.extend_from_slice(query_str.as_bytes());

        let mut flags = 0u8;
        if self.accept.is_some() {
            flags |= FLAG_ACCEPT_PRESENT;
        }
        if self.observe_register {
            flags |= FLAG_OBSERVE_REGISTER;
        }
        if self.block1.is_some() {
            flags |= FLAG_BLOCK1_PRESENT;
        }
        out.push(flags);
        if let Some(accept) = &self.accept {
            out.push(accept.len() as u8);
            out.extend_from_slice(accept.as_bytes());
        }
        if let Some(block1) = &self.block1 {
            out.extend_from_slice(&block1.number.to_be_bytes());
            out.push(block1.size_exponent);
            out.push(block1.more as u8);
        }
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes a datagram received off the UDP socket into a `Request`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ServiceError> {
        let mut cur = Cursor::new(bytes);
        let kind = byte_to_kind(cur.u8()?)?;
        let method = byte_to_method(cur.u8()?)?;
        let message_id = cur.u16()?;
        let token_len = cur.u8()? as usize;
        let token = cur.bytes_of_len(token_len)?;
        let uri_path_len = cur.u16()? as usize;
        let uri_path = cur.string_of_len(uri_path_len)?;
        let query_len = cur.u16()? as usize;
        let query_str = cur.string_of_len(query_len)?;
        let query = if query_str.is_empty() {
            Vec::new()
        } else {
            query_str
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };

        let flags = cur.u8()?;
        let accept = if flags & FLAG_ACCEPT_PRESENT != 0 {
            let len = cur.u8()? as usize;
            Some(cur.string_of_len(len)?)
        } else {
            None
        };
        let observe_register = flags & FLAG_OBSERVE_REGISTER != 0;
        let block1 = if flags & FLAG_BLOCK1_PRESENT != 0 {
            let number = cur.u32()?;
            let size_exponent = cur.u8()?;
            let more = cur.u8()? != 0;
            Some(BlockOption {
                number,
                size_exponent,
                more,
            })
        } else {
            None
        };
        let payload_len = cur.u32()? as usize;
        let payload = cur.bytes_of_len(payload_len)?;

        Ok(Request {
            kind,
            method,
            message_id,
            token,
            uri_path,
            query,
            accept,
            observe_register,
            block1,
            payload,
        })
    }
}

impl Response {
    /// Encodes a response for the UDP socket to send back to the peer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(code_to_byte(self.code));
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.push(self.token.len() as u8);
        out.extend_from_slice(&self.token);
        let mut flags = 0u8;
        if self.observe_sequence.is_some() {
            flags |= 1;
        }
        out.push(flags);
        if let Some(seq) = self.observe_sequence {
            out.extend_from_slice(&seq.to_be_bytes());
        }
        out.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Decodes a response datagram. Used by tests and any future client
    /// harness; the server side only ever encodes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ServiceError> {
        let mut cur = Cursor::new(bytes);
        let code = byte_to_code(cur.u8()?)?;
        let message_id = cur.u16()?;
        let token_len = cur.u8()? as usize;
        let token = cur.bytes_of_len(token_len)?;
        let flags = cur.u8()?;
        let observe_sequence = if flags & 1 != 0 {
            Some(cur.u32()?)
        } else {
            None
        };
        let body_len = cur.u32()? as usize;
        let body = cur.bytes_of_len(body_len)?;
        Ok(Response {
            code,
            message_id,
            token,
            content_type: ACCEPTED_CONTENT_TYPE,
            body,
            observe_sequence,
        })
    }
}

impl Notification {
    /// Encodes a notification as a non-confirmable response carrying the
    /// observe sequence, the shape every Observe-registered peer receives
    /// on a push (spec §4.F).
    pub fn encode(&self, token: Vec<u8>, message_id: u16) -> Vec<u8> {
        Response {
            code: ResponseCode::Content,
            message_id,
            token,
            content_type: ACCEPTED_CONTENT_TYPE,
            body: self.body.clone(),
            observe_sequence: Some(self.sequence),
        }
        .encode()
    }
}

#[cfg(test)]
mod wire_tests {
    use super::*;

    #[test]
    fn request_round_trips_through_the_wire_format() {
        let req = Request {
            kind: MessageKind::Confirmable,
            method: Method::Post,
            message_id: 42,
            token: vec![1, 2, 3],
            uri_path: "6top/cellList".to_string(),
            query: vec![("fd".to_string(), "1".to_string())],
            accept: Some("application/json".to_string()),
            observe_register: false,
            block1: Some(BlockOption {
                number: 0,
                size_exponent: 2,
                more: true,
            }),
            payload: b"{}".to_vec(),
        };
        let decoded = Request::decode(&req.encode()).unwrap();
        assert_eq!(decoded.method, Method::Post);
        assert_eq!(decoded.message_id, 42);
        assert_eq!(decoded.uri_path, "6top/cellList");
        assert_eq!(decoded.query, vec![("fd".to_string(), "1".to_string())]);
        assert_eq!(decoded.block1.unwrap().number, 0);
        assert_eq!(decoded.payload, b"{}");
    }

    #[test]
    fn response_round_trips_through_the_wire_format() {
        let resp = Response::json(ResponseCode::Content, 7, vec![9], b"[1,2]".to_vec());
        let decoded = Response::decode(&resp.encode()).unwrap();
        assert_eq!(decoded.code, ResponseCode::Content);
        assert_eq!(decoded.message_id, 7);
        assert_eq!(decoded.body, b"[1,2]");
        assert!(decoded.observe_sequence.is_none());
    }

    #[test]
    fn truncated_message_is_a_bad_request() {
        assert!(Request::decode(&[0, 0]).is_err());
    }
}
