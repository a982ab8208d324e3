//! Line-buffered IRC frame decoder
//!
//! Turns raw transport bytes into typed lines. Input may arrive fragmented at
//! arbitrary byte boundaries; incomplete trailing data is buffered across
//! calls and a line is only emitted on its terminator. The decoder performs no
//! I/O and never lets a malformed line abort decoding of the lines after it.

use bytes::{Buf, BytesMut};

const CHAT_MESSAGE_MARKER: &str = "PRIVMSG";
const KEEPALIVE_MARKER: &str = "PING";

/// Longest unterminated line the accumulator will hold. Anything beyond this
/// is discarded through its eventual terminator and reported once as
/// `Unrecognized`; real IRC lines are far shorter.
const MAX_LINE_LEN: usize = 8192;

/// One decoded line. `Unrecognized` carries the raw text for debug logging;
/// raw fragments never cross this boundary in any other form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// A chat message that passed the username exclusion filter
    Message { username: String, body: String },
    /// Keep-alive frame; the caller owes the transport a Pong
    Ping { payload: String },
    /// Anything else, including structurally broken chat messages
    Unrecognized { raw: String },
}

/// Stateful decoder holding the partial-line accumulator and the username
/// exclusion predicate.
pub struct LineDecoder {
    buf: BytesMut,
    exclusion: String,
    filtered: u64,
    // true while dropping the tail of a line that overflowed MAX_LINE_LEN
    discarding: bool,
}

impl LineDecoder {
    /// `exclusion` is matched case-insensitively as a substring of the sender
    /// name; matching senders are dropped at decode time. Filtering bot-like
    /// usernames here is deliberate policy, not a parsing artifact.
    pub fn new(exclusion: &str) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            exclusion: exclusion.to_lowercase(),
            filtered: 0,
            discarding: false,
        }
    }

    /// Number of chat messages dropped by the exclusion filter so far.
    pub fn filtered(&self) -> u64 {
        self.filtered
    }

    /// Feed newly read bytes and drain every complete line.
    pub fn feed(&mut self, data: &[u8]) -> Vec<DecodedLine> {
        self.buf.extend_from_slice(data);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if self.discarding {
                // tail of an already-reported oversized line
                self.discarding = false;
                continue;
            }
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            if let Some(decoded) = self.decode_line(trimmed) {
                out.push(decoded);
            }
        }
        // an unterminated line never holds more than MAX_LINE_LEN bytes; the
        // overflow is reported once and the rest dropped through its
        // terminator
        if self.buf.len() > MAX_LINE_LEN {
            if !self.discarding {
                let head = String::from_utf8_lossy(&self.buf[..64]).into_owned();
                out.push(DecodedLine::Unrecognized {
                    raw: format!("{} [oversized line discarded]", head),
                });
                self.discarding = true;
            }
            self.buf.clear();
        }
        if self.buf.capacity() > 1 << 20 && !self.buf.has_remaining() {
            self.buf = BytesMut::with_capacity(4096);
        }
        out
    }

    /// Decode one complete line. Returns `None` only for filtered senders.
    fn decode_line(&mut self, line: &str) -> Option<DecodedLine> {
        if line.starts_with(KEEPALIVE_MARKER) {
            let payload = line[KEEPALIVE_MARKER.len()..].trim().to_string();
            return Some(DecodedLine::Ping { payload });
        }

        if line.contains(CHAT_MESSAGE_MARKER) {
            // ":nick!nick@host PRIVMSG #chan :message body"
            let mut parts = line.splitn(3, ':');
            let leading = parts.next();
            let prefix = parts.next();
            let body = parts.next();

            let (Some(_), Some(prefix), Some(body)) = (leading, prefix, body) else {
                return Some(DecodedLine::Unrecognized {
                    raw: line.to_string(),
                });
            };

            let username = prefix.split('!').next().unwrap_or_default().to_string();
            if !self.exclusion.is_empty() && username.to_lowercase().contains(&self.exclusion) {
                self.filtered += 1;
                return None;
            }

            return Some(DecodedLine::Message {
                username,
                body: body.trim().to_string(),
            });
        }

        Some(DecodedLine::Unrecognized {
            raw: line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(decoder: &mut LineDecoder, input: &str) -> Vec<DecodedLine> {
        decoder.feed(input.as_bytes())
    }

    #[test]
    fn privmsg_yields_username_and_body() {
        let mut decoder = LineDecoder::new("bot");
        let lines = decode_all(
            &mut decoder,
            ":alice!alice@alice.tmi.twitch.tv PRIVMSG #jynxzi :that was hype\r\n",
        );
        assert_eq!(
            lines,
            vec![DecodedLine::Message {
                username: "alice".to_string(),
                body: "that was hype".to_string(),
            }]
        );
    }

    #[test]
    fn ping_never_becomes_a_message() {
        let mut decoder = LineDecoder::new("bot");
        let lines = decode_all(&mut decoder, "PING :tmi.twitch.tv\r\n");
        assert_eq!(
            lines,
            vec![DecodedLine::Ping {
                payload: ":tmi.twitch.tv".to_string()
            }]
        );
    }

    #[test]
    fn excluded_usernames_are_dropped() {
        let mut decoder = LineDecoder::new("bot");
        let lines = decode_all(
            &mut decoder,
            ":Nightbot!nightbot@host PRIVMSG #chan :hi\r\n:alice!a@host PRIVMSG #chan :hello\r\n",
        );
        assert_eq!(lines.len(), 1);
        assert!(matches!(
            &lines[0],
            DecodedLine::Message { username, .. } if username == "alice"
        ));
        assert_eq!(decoder.filtered(), 1);
    }

    #[test]
    fn structurally_broken_privmsg_is_unrecognized() {
        // marker present but only two colon-separated parts
        let mut decoder = LineDecoder::new("bot");
        let lines = decode_all(&mut decoder, "PRIVMSG #chan :hello\r\n");
        assert_eq!(lines.len(), 1);
        assert!(matches!(lines[0], DecodedLine::Unrecognized { .. }));
    }

    #[test]
    fn malformed_line_does_not_abort_following_lines() {
        let mut decoder = LineDecoder::new("bot");
        let input = "garbage PRIVMSG\r\n:alice!a@host PRIVMSG #chan :ok\r\n";
        let lines = decode_all(&mut decoder, input);
        assert_eq!(lines.len(), 2);
        assert!(matches!(lines[0], DecodedLine::Unrecognized { .. }));
        assert!(matches!(lines[1], DecodedLine::Message { .. }));
    }

    #[test]
    fn incomplete_tail_is_buffered_across_calls() {
        let mut decoder = LineDecoder::new("bot");
        assert!(decoder.feed(b":alice!a@host PRIV").is_empty());
        let lines = decoder.feed(b"MSG #chan :split msg\r\nPING\r\n");
        assert_eq!(lines.len(), 2);
        assert!(matches!(
            &lines[0],
            DecodedLine::Message { body, .. } if body == "split msg"
        ));
        assert!(matches!(lines[1], DecodedLine::Ping { .. }));
    }

    #[test]
    fn unterminated_line_is_capped_not_buffered_forever() {
        let mut decoder = LineDecoder::new("bot");

        // 64 KiB of garbage without a terminator, fed in read-sized chunks
        let garbage = vec![b'a'; 64 * 1024];
        let mut lines = Vec::new();
        for chunk in garbage.chunks(4096) {
            lines.extend(decoder.feed(chunk));
        }
        assert_eq!(lines.len(), 1);
        assert!(matches!(lines[0], DecodedLine::Unrecognized { .. }));
        assert!(decoder.buf.len() <= MAX_LINE_LEN);

        // the eventual terminator ends the discard; decoding resumes intact
        let lines = decoder.feed(b"tail\r\n:alice!a@host PRIVMSG #chan :ok\r\n");
        assert_eq!(lines.len(), 1);
        assert!(matches!(
            &lines[0],
            DecodedLine::Message { username, .. } if username == "alice"
        ));
    }

    #[test]
    fn bare_newline_terminator_is_accepted() {
        let mut decoder = LineDecoder::new("bot");
        let lines = decoder.feed(b":a!a@h PRIVMSG #c :x\n");
        assert_eq!(lines.len(), 1);
    }

    proptest! {
        /// Decoding a byte stream split at arbitrary points yields the same
        /// ordered line sequence as decoding it in one call.
        #[test]
        fn fragmentation_invariance(
            lines in proptest::collection::vec(
                prop_oneof![
                    Just("PING :tmi.twitch.tv\r\n".to_string()),
                    Just(":alice!a@h PRIVMSG #chan :hype train\r\n".to_string()),
                    Just(":carlbot!c@h PRIVMSG #chan :beep\r\n".to_string()),
                    Just(":tmi.twitch.tv 001 nick :Welcome\r\n".to_string()),
                    Just("PRIVMSG broken\r\n".to_string()),
                ],
                0..8,
            ),
            chunk_size in 1usize..24,
        ) {
            let input: String = lines.concat();

            let mut whole = LineDecoder::new("bot");
            let expected = whole.feed(input.as_bytes());

            let mut chunked = LineDecoder::new("bot");
            let mut actual = Vec::new();
            for chunk in input.as_bytes().chunks(chunk_size) {
                actual.extend(chunked.feed(chunk));
            }

            prop_assert_eq!(actual, expected);
            prop_assert_eq!(chunked.filtered(), whole.filtered());
        }
    }
}
