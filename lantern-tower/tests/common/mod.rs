#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};

/// A response body yielding a fixed list of chunks.
#[derive(Debug, Default)]
pub struct TestBody {
    chunks: VecDeque<Bytes>,
}

impl TestBody {
    pub fn new(chunks: &[&'static str]) -> Self {
        TestBody {
            chunks: chunks.iter().map(|chunk| Bytes::from_static(chunk.as_bytes())).collect(),
        }
    }
}

impl Body for TestBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Poll::Ready(self.chunks.pop_front().map(|chunk| Ok(Frame::data(chunk))))
    }
}

/// Polls a body until it ends and returns its data.
pub async fn collect<B>(body: &mut B) -> Vec<B::Data>
where
    B: Body + Unpin,
    B::Error: fmt::Debug,
{
    let mut data = Vec::new();
    while let Some(frame) = std::future::poll_fn(|cx| Pin::new(&mut *body).poll_frame(cx)).await {
        if let Ok(chunk) = frame.unwrap().into_data() {
            data.push(chunk);
        }
    }
    data
}

#[derive(Debug)]
pub struct ExampleError;

impl fmt::Display for ExampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("error message")
    }
}

impl std::error::Error for ExampleError {}

pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}
