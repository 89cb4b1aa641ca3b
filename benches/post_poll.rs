//! Post and poll latency benchmarks over simulated rings.
//!
//! The rings live in ordinary host memory with a software completion
//! producer standing in for the device, so the numbers isolate the
//! software side of the protocol: descriptor emission plus trigger store,
//! and record validation plus decode.
//!
//! Run with:
//! ```bash
//! cargo bench --bench post_poll
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use mlx5_fastpath::cq::{CompletionRing, CqConfig, CqInfo, CqeSize};
use mlx5_fastpath::sq::{SendRing, SqInfo};
use mlx5_fastpath::test_utils::{AlignedBuffer, CqeFields, CqeWriter};

const QPN: u32 = 0x12d;
const RING_CNT: u32 = 256;

fn bench_post(c: &mut Criterion) {
    let ring_buf = AlignedBuffer::new((RING_CNT * 64) as usize);
    let trigger_buf = AlignedBuffer::new(512);
    let mut sq = unsafe {
        SendRing::new(SqInfo {
            buf: ring_buf.as_ptr(),
            wqe_cnt: RING_CNT,
            stride: 64,
            sqn: QPN,
            trigger_reg: trigger_buf.as_ptr(),
            trigger_size: 256,
        })
    }
    .expect("create send ring");

    let src = AlignedBuffer::new(4096);
    let dst = AlignedBuffer::new(4096);

    let mut group = c.benchmark_group("send_ring");
    group.throughput(Throughput::Elements(1));
    group.bench_function("post_rdma_write", |b| {
        b.iter(|| {
            let handle =
                unsafe { sq.post_rdma_write(src.addr(), 64, 0x11, dst.addr(), 0x22) }
                    .expect("post");
            sq.mark_completed(1);
            black_box(handle);
        })
    });
    group.finish();
}

fn bench_consume(c: &mut Criterion) {
    let ring_buf = AlignedBuffer::new((RING_CNT * 64) as usize);
    let dbrec = AlignedBuffer::new(8);
    let writer = CqeWriter::new(ring_buf.as_ptr(), RING_CNT, 64);
    let mut cq = unsafe {
        CompletionRing::new(
            CqInfo {
                buf: ring_buf.as_ptr(),
                cqe_cnt: RING_CNT,
                dbrec: dbrec.as_ptr() as *mut u32,
            },
            &CqConfig {
                cqe_size: CqeSize::Size64,
                ..Default::default()
            },
        )
    }
    .expect("create completion ring");

    let mut pi = 0u32;
    let mut group = c.benchmark_group("completion_ring");
    group.throughput(Throughput::Elements(1));
    group.bench_function("consume_one", |b| {
        b.iter(|| {
            writer.write(
                pi,
                CqeFields {
                    byte_cnt: 64,
                    wqe_counter: pi as u16,
                    ..Default::default()
                },
            );
            let completion = cq
                .try_consume_one()
                .expect("decode")
                .expect("record just written");
            pi = pi.wrapping_add(1);
            black_box(completion);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_post, bench_consume);
criterion_main!(benches);
