//! Lazy adapter from a byte stream to decoded events

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use tracing::debug;

use super::decoder::StreamDecoder;
use super::event::DecodedEvent;

struct DecodeState<S> {
    inner: S,
    decoder: StreamDecoder,
    ready: VecDeque<DecodedEvent>,
    finished: bool,
}

/// Decode events lazily as chunks arrive
///
/// Chunks are pulled from `chunks` only when the caller asks for the next
/// event and none is ready. A transport error is yielded once and ends the
/// stream; a clean end flushes the decoder.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<DecodedEvent, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        inner: chunks,
        decoder: StreamDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.ready.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.feed_events(chunk.as_ref());
                    st.ready.extend(events);
                }
                Some(Err(e)) => {
                    debug!("decode_stream: transport error, ending stream");
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    debug!("decode_stream: transport closed, flushing decoder");
                    st.finished = true;
                    let events = st.decoder.finish_events();
                    st.ready.extend(events);
                }
            }
        }
    })
}
