//! Renders thumbnails on a background worker while a tokio task drives the
//! host tick.
//!
//! Run with `RUST_LOG=slotqueue=trace cargo run --example thumbnail_queue`
//! to watch the worker start, harvest and stop itself.

use std::sync::Mutex;
use std::time::Duration;

use slotqueue::{BackgroundTaskQueue, Backlog, IdleGrace, ObjectPool, QueuedTask, Ticker};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SIDE: usize = 64;
const SCALE: usize = 4;

/// A finished thumbnail, delivered on the host tick. Both buffers go back
/// to the pool once the host is done with them.
struct Rendered {
    image: u32,
    revision: u32,
    source: Vec<u8>,
    pixels: Vec<u8>,
}

struct Thumbnail {
    image: u32,
    revision: u32,
    source: Mutex<Vec<u8>>,
    output: Mutex<Vec<u8>>,
    done: UnboundedSender<Rendered>,
}

impl QueuedTask for Thumbnail {
    /// A newer revision of the same image replaces any queued render of it.
    fn before_enqueue(&self, backlog: &mut Backlog<'_, Self>) -> bool {
        let stale: Vec<_> = backlog
            .pending()
            .filter(|(_, queued)| queued.image == self.image)
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            if backlog.cancel(id).is_ok() {
                info!(image = self.image, "superseded queued render");
            }
        }
        true
    }

    fn process(&self) {
        let side = SIDE / SCALE;
        let source = self.source.lock().unwrap_or_else(|e| e.into_inner());
        let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());
        output.clear();
        for y in 0..side {
            for x in 0..side {
                let mut sum = 0usize;
                for dy in 0..SCALE {
                    let row = (y * SCALE + dy) * SIDE;
                    for dx in 0..SCALE {
                        sum += usize::from(source[row + x * SCALE + dx]);
                    }
                }
                output.push((sum / (SCALE * SCALE)) as u8);
            }
        }
        // Pretend the encoder is slow.
        std::thread::sleep(Duration::from_millis(20));
    }

    fn after_complete(&self) {
        let source = std::mem::take(&mut *self.source.lock().unwrap_or_else(|e| e.into_inner()));
        let pixels = std::mem::take(&mut *self.output.lock().unwrap_or_else(|e| e.into_inner()));
        let _ = self.done.send(Rendered {
            image: self.image,
            revision: self.revision,
            source,
            pixels,
        });
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let ticker = Ticker::new();
    let host = tokio::spawn(ticker.clone().drive(Duration::from_millis(16)));

    let queue = BackgroundTaskQueue::new(ticker);
    let (done, mut rendered) = mpsc::unbounded_channel();
    let mut buffers: ObjectPool<Vec<u8>> = ObjectPool::new(8);
    let grace = IdleGrace::After(Duration::from_millis(250));

    // Image 1 is edited while earlier renders of it are still queued.
    let edits = [(1, 0), (2, 0), (1, 1), (3, 0), (1, 2)];
    let mut accepted = 0;
    for (image, revision) in edits {
        let mut source = buffers.spawn();
        source.clear();
        source.extend((0..SIDE * SIDE).map(|i| ((i as u32 + image * 31 + revision) % 251) as u8));
        let mut output = buffers.spawn();
        output.clear();

        let task = Thumbnail {
            image,
            revision,
            source: Mutex::new(source),
            output: Mutex::new(output),
            done: done.clone(),
        };
        if queue.enqueue(task, grace)? {
            accepted += 1;
        }
    }
    drop(done);
    info!(accepted, backlog = queue.len(), "queued thumbnail renders");

    while let Some(Rendered {
        image,
        revision,
        source,
        pixels,
    }) = rendered.recv().await
    {
        let median = {
            let mut scratch = buffers.lease();
            scratch.clear();
            scratch.extend_from_slice(&pixels);
            scratch.sort_unstable();
            scratch.get(scratch.len() / 2).copied().unwrap_or_default()
        };
        info!(image, revision, bytes = pixels.len(), median, "thumbnail ready");
        buffers.despawn(source);
        buffers.despawn(pixels);
    }
    // Superseded renders were dropped with their buffers; the rest are back.
    info!(idle_buffers = buffers.len(), "rendered buffers returned to the pool");

    // Let the idle grace period run out so the worker stops on its own.
    while queue.is_working() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("background worker stopped after idling");

    host.abort();
    Ok(())
}
