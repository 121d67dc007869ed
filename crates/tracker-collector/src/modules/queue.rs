//! 워커 간 공유 작업 큐.

use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Mutex로 보호되는 FIFO 작업 큐.
///
/// 락은 push/pop 동안에만 잡으며 네트워크 호출 중에는 잡지 않습니다.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    /// 뒤에 추가
    pub async fn push(&self, item: T) {
        self.items.lock().await.push_back(item);
    }

    /// 앞에 추가 (장애 후 재배정용)
    pub async fn push_front(&self, item: T) {
        self.items.lock().await.push_front(item);
    }

    pub async fn pop(&self) -> Option<T> {
        self.items.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// 남은 항목 전부 꺼내기
    pub async fn drain_all(&self) -> Vec<T> {
        self.items.lock().await.drain(..).collect()
    }
}
