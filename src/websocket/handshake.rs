use std::collections::HashMap;
use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::websocket::WsError;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_REQUEST_HEAD: usize = 8 * 1024;

pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

pub struct UpgradeRequest {
    pub path: String,
    pub key: String,
}

async fn read_request_head<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, WsError> {
    let mut head = Vec::with_capacity(512);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_REQUEST_HEAD {
            return Err(WsError::BadHandshake("request head too large".to_string()));
        }
        head.push(reader.read_u8().await?);
    }
    String::from_utf8(head).map_err(|_| WsError::BadHandshake("request head is not utf-8".to_string()))
}

pub fn parse_upgrade_request(head: &str) -> Result<UpgradeRequest, WsError> {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, path) = (parts.next(), parts.next());
    let path = match (method, path) {
        (Some("GET"), Some(path)) => path.to_string(),
        _ => return Err(WsError::BadHandshake(format!("unexpected request line `{}`", request_line))),
    };
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
        .collect();
    let is_upgrade = headers.get("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !is_upgrade {
        return Err(WsError::BadHandshake("missing `Upgrade: websocket`".to_string()));
    }
    let key = headers.get("sec-websocket-key")
        .filter(|k| !k.is_empty())
        .ok_or_else(|| WsError::BadHandshake("missing Sec-WebSocket-Key".to_string()))?;
    Ok(UpgradeRequest {
        path,
        key: key.clone(),
    })
}

/// Runs the server half of the opening handshake. `reader` should be
/// buffered and must be the one frames are read from afterwards, since the
/// client may pipeline its first frame behind the request head. On success
/// the requested path is returned.
pub async fn accept<R, W>(reader: &mut R, writer: &mut W) -> Result<String, WsError>
    where R: AsyncRead + Unpin,
          W: AsyncWrite + Unpin {
    let head = read_request_head(reader).await?;
    match parse_upgrade_request(&head) {
        Ok(request) => {
            let response = format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {}\r\n\r\n",
                compute_accept_key(&request.key));
            writer.write_all(response.as_bytes()).await?;
            Ok(request.path)
        }
        Err(e) => {
            writer.write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n").await?;
            Err(e)
        }
    }
}
