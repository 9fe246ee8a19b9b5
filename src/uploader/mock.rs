// 测试用分片传输：记录请求顺序、在途数量，并按偏移重建文件内容

use crate::uploader::{ChunkRequest, ChunkTransport, UploadError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type DelayFn = Box<dyn Fn(&ChunkRequest) -> Duration + Send + Sync>;
type FailFn = Box<dyn Fn(&ChunkRequest) -> bool + Send + Sync>;
type HookFn = Box<dyn Fn(&ChunkRequest) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockEvent {
    Sent {
        file: String,
        offset: u64,
        is_final: bool,
        len: usize,
    },
    Settled {
        file: String,
        offset: u64,
        is_final: bool,
    },
}

pub(crate) struct MockTransport {
    delay: DelayFn,
    fail: FailFn,
    hook: HookFn,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<MockEvent>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    finals: Mutex<HashMap<String, usize>>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            delay: Box::new(|_| Duration::ZERO),
            fail: Box::new(|_| false),
            hook: Box::new(|_| {}),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            finals: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn with_delay(
        mut self,
        delay: impl Fn(&ChunkRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub(crate) fn with_failure(
        mut self,
        fail: impl Fn(&ChunkRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.fail = Box::new(fail);
        self
    }

    /// 请求发出时同步调用（可用于在特定分片上触发取消）
    pub(crate) fn with_hook(mut self, hook: impl Fn(&ChunkRequest) + Send + Sync + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub(crate) fn events(&self) -> Vec<MockEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 按偏移写入后的文件内容
    pub(crate) fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }

    pub(crate) fn final_markers(&self, name: &str) -> usize {
        self.finals.lock().get(name).copied().unwrap_or(0)
    }

    /// 按发送顺序列出收到的文件名（去重）
    pub(crate) fn files_in_order(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for event in self.events.lock().iter() {
            if let MockEvent::Sent { file, .. } = event {
                if !names.contains(file) {
                    names.push(file.clone());
                }
            }
        }
        names
    }
}

#[async_trait]
impl ChunkTransport for MockTransport {
    async fn send(&self, request: ChunkRequest) -> Result<(), UploadError> {
        (self.hook)(&request);
        self.events.lock().push(MockEvent::Sent {
            file: request.file_name.clone(),
            offset: request.offset,
            is_final: request.is_final,
            len: request.body.len(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let delay = (self.delay)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.events.lock().push(MockEvent::Settled {
            file: request.file_name.clone(),
            offset: request.offset,
            is_final: request.is_final,
        });

        if (self.fail)(&request) {
            return Err(UploadError::Rejected {
                status: 500,
                message: format!("mock failure at offset {}", request.offset),
            });
        }

        if request.is_final {
            *self.finals.lock().entry(request.file_name).or_insert(0) += 1;
        } else {
            let mut files = self.files.lock();
            let file = files.entry(request.file_name).or_default();
            let end = request.offset as usize + request.body.len();
            if file.len() < end {
                file.resize(end, 0);
            }
            file[request.offset as usize..end].copy_from_slice(&request.body);
        }
        Ok(())
    }
}
