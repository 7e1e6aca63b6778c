//! XML-RPC document codec.
//!
//! Encodes `<methodCall>` requests and decodes `<methodResponse>` replies
//! (a single result value, or a fault struct) to and from [`RpcValue`].
//! The server-side inverse (`decode_call`, `encode_response`,
//! `encode_fault`) backs the mock daemon used in tests.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::value::{RpcStruct, RpcValue};

/// Errors decoding an XML-RPC document.
#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("unexpected {found}, expected {expected}")]
    Unexpected { expected: String, found: String },

    #[error("invalid {kind} value {text:?}")]
    InvalidScalar { kind: &'static str, text: String },

    #[error("unknown value type <{0}>")]
    UnknownType(String),

    #[error("fault response lacks an int faultCode and string faultString")]
    MalformedFault,

    #[error("values nested deeper than {0} levels")]
    TooDeep(usize),
}

/// A decoded `<methodResponse>`.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    /// The method returned a value.
    Success(RpcValue),
    /// The server rejected the call.
    Fault { code: i64, message: String },
}

/// A decoded `<methodCall>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<RpcValue>,
}

// ── Encoding ────────────────────────────────────────────────────────────

const XML_DECL: &str = r#"<?xml version="1.0"?>"#;

/// Encode a `<methodCall>` document.
pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Encode a successful `<methodResponse>` carrying `value`.
pub fn encode_response(value: &RpcValue) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<methodResponse><params><param>");
    write_value(&mut out, value);
    out.push_str("</param></params></methodResponse>");
    out
}

/// Encode a fault `<methodResponse>`.
pub fn encode_fault(code: i64, message: &str) -> String {
    let mut fault = RpcStruct::new();
    fault.insert("faultCode".to_string(), RpcValue::Int(code));
    fault.insert("faultString".to_string(), RpcValue::from(message));

    let mut out = String::from(XML_DECL);
    out.push_str("<methodResponse><fault>");
    write_value(&mut out, &RpcValue::Struct(fault));
    out.push_str("</fault></methodResponse>");
    out
}

fn write_value(out: &mut String, value: &RpcValue) {
    out.push_str("<value>");
    match value {
        RpcValue::Bool(b) => {
            out.push_str(if *b {
                "<boolean>1</boolean>"
            } else {
                "<boolean>0</boolean>"
            });
        }
        RpcValue::Int(i) => {
            // <i8> is an extension; only use it when <int> cannot hold the value
            if i32::try_from(*i).is_ok() {
                out.push_str(&format!("<int>{i}</int>"));
            } else {
                out.push_str(&format!("<i8>{i}</i8>"));
            }
        }
        RpcValue::Double(d) => out.push_str(&format!("<double>{d}</double>")),
        RpcValue::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        RpcValue::DateTime(dt) => {
            out.push_str(&format!(
                "<dateTime.iso8601>{}</dateTime.iso8601>",
                dt.format("%Y%m%dT%H:%M:%S")
            ));
        }
        RpcValue::Base64(bytes) => {
            out.push_str(&format!("<base64>{}</base64>", BASE64.encode(bytes)));
        }
        RpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        RpcValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        RpcValue::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

// ── Decoding ────────────────────────────────────────────────────────────

/// Deepest `<value>` nesting a document may use.
pub const MAX_DEPTH: usize = 64;

/// Decode a `<methodResponse>` document.
pub fn decode_response(xml: &str) -> Result<MethodResponse, XmlRpcError> {
    let mut tokens = Tokens::new(xml);
    tokens.expect_open("methodResponse")?;

    match tokens.next_significant()? {
        Token::Open(tag) if tag == "params" => {
            tokens.expect_open("param")?;
            let value = parse_value(&mut tokens)?;
            tokens.expect_close("param")?;
            tokens.expect_close("params")?;
            tokens.expect_close("methodResponse")?;
            Ok(MethodResponse::Success(value))
        }
        Token::Open(tag) if tag == "fault" => {
            let value = parse_value(&mut tokens)?;
            tokens.expect_close("fault")?;
            tokens.expect_close("methodResponse")?;
            fault_from_value(value)
        }
        other => Err(unexpected("<params> or <fault>", &other)),
    }
}

/// Decode a `<methodCall>` document.
pub fn decode_call(xml: &str) -> Result<MethodCall, XmlRpcError> {
    let mut tokens = Tokens::new(xml);
    tokens.expect_open("methodCall")?;
    tokens.expect_open("methodName")?;
    let method = tokens.read_text("methodName")?.trim().to_string();

    let mut params = Vec::new();
    match tokens.next_significant()? {
        Token::Open(tag) if tag == "params" => {
            loop {
                match tokens.next_significant()? {
                    Token::Open(tag) if tag == "param" => {
                        params.push(parse_value(&mut tokens)?);
                        tokens.expect_close("param")?;
                    }
                    Token::Close(tag) if tag == "params" => break,
                    other => return Err(unexpected("<param> or </params>", &other)),
                }
            }
            tokens.expect_close("methodCall")?;
        }
        Token::Empty(tag) if tag == "params" => tokens.expect_close("methodCall")?,
        Token::Close(tag) if tag == "methodCall" => {}
        other => return Err(unexpected("<params> or </methodCall>", &other)),
    }

    Ok(MethodCall { method, params })
}

fn fault_from_value(value: RpcValue) -> Result<MethodResponse, XmlRpcError> {
    let members = value.as_struct().ok_or(XmlRpcError::MalformedFault)?;
    match (members.get("faultCode"), members.get("faultString")) {
        (Some(RpcValue::Int(code)), Some(RpcValue::String(message))) => Ok(MethodResponse::Fault {
            code: *code,
            message: message.clone(),
        }),
        _ => Err(XmlRpcError::MalformedFault),
    }
}

/// Parse a `<value>` element, including its opening tag.
fn parse_value(tokens: &mut Tokens<'_>) -> Result<RpcValue, XmlRpcError> {
    match tokens.next_significant()? {
        Token::Open(tag) if tag == "value" => parse_value_body(tokens),
        Token::Empty(tag) if tag == "value" => Ok(RpcValue::String(String::new())),
        other => Err(unexpected("<value>", &other)),
    }
}

/// Parse the content of a `<value>` whose opening tag was consumed.
fn parse_value_body(tokens: &mut Tokens<'_>) -> Result<RpcValue, XmlRpcError> {
    if tokens.depth >= MAX_DEPTH {
        return Err(XmlRpcError::TooDeep(MAX_DEPTH));
    }
    tokens.depth += 1;
    let value = parse_value_content(tokens);
    tokens.depth -= 1;
    value
}

fn parse_value_content(tokens: &mut Tokens<'_>) -> Result<RpcValue, XmlRpcError> {
    // A value with no type element is a string
    let mut untyped = String::new();
    loop {
        match tokens.next()? {
            Token::Text(text) => untyped.push_str(&text),
            Token::Close(tag) if tag == "value" => return Ok(RpcValue::String(untyped)),
            Token::Open(tag) => {
                let value = parse_typed(tokens, &tag)?;
                tokens.expect_close("value")?;
                return Ok(value);
            }
            Token::Empty(tag) => {
                let value = empty_typed(&tag)?;
                tokens.expect_close("value")?;
                return Ok(value);
            }
            other => return Err(unexpected("value content", &other)),
        }
    }
}

fn parse_typed(tokens: &mut Tokens<'_>, tag: &str) -> Result<RpcValue, XmlRpcError> {
    match tag {
        "i4" | "int" | "i8" => {
            let text = tokens.read_text(tag)?;
            text.trim()
                .parse::<i64>()
                .map(RpcValue::Int)
                .map_err(|_| XmlRpcError::InvalidScalar { kind: "int", text })
        }
        "boolean" => {
            let text = tokens.read_text(tag)?;
            match text.trim() {
                "1" | "true" => Ok(RpcValue::Bool(true)),
                "0" | "false" => Ok(RpcValue::Bool(false)),
                _ => Err(XmlRpcError::InvalidScalar {
                    kind: "boolean",
                    text,
                }),
            }
        }
        "double" => {
            let text = tokens.read_text(tag)?;
            text.trim()
                .parse::<f64>()
                .map(RpcValue::Double)
                .map_err(|_| XmlRpcError::InvalidScalar {
                    kind: "double",
                    text,
                })
        }
        "string" => tokens.read_text(tag).map(RpcValue::String),
        "dateTime.iso8601" => {
            let text = tokens.read_text(tag)?;
            parse_datetime(&text).map(RpcValue::DateTime)
        }
        "base64" => {
            let text = tokens.read_text(tag)?;
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64
                .decode(compact.as_bytes())
                .map(RpcValue::Base64)
                .map_err(|_| XmlRpcError::InvalidScalar {
                    kind: "base64",
                    text,
                })
        }
        "nil" => {
            tokens.read_text(tag)?;
            Ok(RpcValue::Nil)
        }
        "struct" => parse_struct_body(tokens).map(RpcValue::Struct),
        "array" => parse_array_body(tokens).map(RpcValue::Array),
        other => Err(XmlRpcError::UnknownType(other.to_string())),
    }
}

fn empty_typed(tag: &str) -> Result<RpcValue, XmlRpcError> {
    match tag {
        "string" => Ok(RpcValue::String(String::new())),
        "nil" => Ok(RpcValue::Nil),
        "base64" => Ok(RpcValue::Base64(Vec::new())),
        "struct" => Ok(RpcValue::Struct(RpcStruct::new())),
        "i4" | "int" | "i8" | "boolean" | "double" | "dateTime.iso8601" => {
            Err(XmlRpcError::InvalidScalar {
                kind: "scalar",
                text: format!("<{tag}/>"),
            })
        }
        other => Err(XmlRpcError::UnknownType(other.to_string())),
    }
}

fn parse_struct_body(tokens: &mut Tokens<'_>) -> Result<RpcStruct, XmlRpcError> {
    let mut members = RpcStruct::new();
    loop {
        match tokens.next_significant()? {
            Token::Open(tag) if tag == "member" => {
                tokens.expect_open("name")?;
                let name = tokens.read_text("name")?;
                let value = parse_value(tokens)?;
                tokens.expect_close("member")?;
                members.insert(name, value);
            }
            Token::Close(tag) if tag == "struct" => return Ok(members),
            other => return Err(unexpected("<member> or </struct>", &other)),
        }
    }
}

fn parse_array_body(tokens: &mut Tokens<'_>) -> Result<Vec<RpcValue>, XmlRpcError> {
    let mut items = Vec::new();
    match tokens.next_significant()? {
        Token::Open(tag) if tag == "data" => loop {
            match tokens.next_significant()? {
                Token::Open(tag) if tag == "value" => items.push(parse_value_body(tokens)?),
                Token::Empty(tag) if tag == "value" => items.push(RpcValue::String(String::new())),
                Token::Close(tag) if tag == "data" => break,
                other => return Err(unexpected("<value> or </data>", &other)),
            }
        },
        Token::Empty(tag) if tag == "data" => {}
        other => return Err(unexpected("<data>", &other)),
    }
    tokens.expect_close("array")?;
    Ok(items)
}

fn parse_datetime(text: &str) -> Result<DateTime<Utc>, XmlRpcError> {
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Zone-less forms are taken as UTC
    for format in ["%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(XmlRpcError::InvalidScalar {
        kind: "dateTime.iso8601",
        text: text.to_string(),
    })
}

fn unexpected(expected: &str, found: &Token) -> XmlRpcError {
    XmlRpcError::Unexpected {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

// ── Token stream ────────────────────────────────────────────────────────

#[derive(Debug)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open(tag) => write!(f, "<{tag}>"),
            Token::Close(tag) => write!(f, "</{tag}>"),
            Token::Empty(tag) => write!(f, "<{tag}/>"),
            Token::Text(text) => write!(f, "text {text:?}"),
            Token::Eof => f.write_str("end of document"),
        }
    }
}

/// Element-level view over the quick-xml event stream.
struct Tokens<'a> {
    reader: Reader<&'a [u8]>,
    /// Open `<value>` elements.
    depth: usize,
}

impl<'a> Tokens<'a> {
    fn new(xml: &'a str) -> Self {
        Self {
            reader: Reader::from_str(xml),
            depth: 0,
        }
    }

    fn next(&mut self) -> Result<Token, XmlRpcError> {
        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| XmlRpcError::Syntax(e.to_string()))?;
            return match event {
                Event::Start(e) => Ok(Token::Open(tag_name(e.name().as_ref()))),
                Event::End(e) => Ok(Token::Close(tag_name(e.name().as_ref()))),
                Event::Empty(e) => Ok(Token::Empty(tag_name(e.name().as_ref()))),
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| XmlRpcError::Syntax(e.to_string()))?;
                    Ok(Token::Text(text.into_owned()))
                }
                Event::CData(e) => Ok(Token::Text(
                    String::from_utf8_lossy(&e.into_inner()).into_owned(),
                )),
                Event::Eof => Ok(Token::Eof),
                // declarations, comments, processing instructions, doctype
                _ => continue,
            };
        }
    }

    /// Next token, skipping whitespace between elements.
    fn next_significant(&mut self) -> Result<Token, XmlRpcError> {
        loop {
            match self.next()? {
                Token::Text(text) if text.trim().is_empty() => continue,
                token => return Ok(token),
            }
        }
    }

    fn expect_open(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.next_significant()? {
            Token::Open(tag) if tag == name => Ok(()),
            other => Err(unexpected(&format!("<{name}>"), &other)),
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.next_significant()? {
            Token::Close(tag) if tag == name => Ok(()),
            other => Err(unexpected(&format!("</{name}>"), &other)),
        }
    }

    /// Collect character data up to the closing tag `name`.
    fn read_text(&mut self, name: &str) -> Result<String, XmlRpcError> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Token::Text(chunk) => text.push_str(&chunk),
                Token::Close(tag) if tag == name => return Ok(text),
                other => return Err(unexpected(&format!("</{name}>"), &other)),
            }
        }
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
