use criterion::{black_box, criterion_group, criterion_main, Criterion};
use diagbridge_core::{
    AsyncTaskId, AsyncTaskTracker, ChannelClient, ContextInfo, ContextMarker, Debugger,
    DebuggerConfig, ListenerId, SimulatedEngine,
};
use std::rc::Rc;

fn bench_marker_parsing(c: &mut Criterion) {
    let encoded = ContextMarker {
        group_id: 12,
        context_id: 3400,
        aux_data: "{\"isDefault\":true,\"frameId\":\"frame,1\"}".to_string(),
    }
    .encode();
    c.bench_function("context_marker_parse", |b| {
        b.iter(|| {
            let _ = black_box(ContextMarker::parse(black_box(&encoded)));
        })
    });
}

fn bench_context_resolution(c: &mut Criterion) {
    let engine = Rc::new(SimulatedEngine::new());
    let (client, _remote) = ChannelClient::new();
    let debugger = Debugger::new(engine.clone(), Rc::new(client), DebuggerConfig::default());
    let context = engine.create_context();
    let _ = debugger.mark_context(&ContextInfo::new(context, 7, "aux"));

    c.bench_function("resolve_group_id", |b| {
        b.iter(|| {
            let _ = black_box(debugger.resolve_group_id(black_box(context)));
        })
    });
}

fn bench_async_task_transitions(c: &mut Criterion) {
    let tracker = AsyncTaskTracker::new();
    tracker.set_async_call_stack_depth(ListenerId(1), 8);

    c.bench_function("async_task_lifecycle", |b| {
        b.iter(|| {
            for id in 0..16 {
                let task = AsyncTaskId(id);
                tracker.async_task_scheduled(1, "setTimeout", task, false);
                tracker.async_task_started(1, task);
                let _ = black_box(tracker.current_async_call_chain(1));
                tracker.async_task_finished(task);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_marker_parsing,
    bench_context_resolution,
    bench_async_task_transitions
);
criterion_main!(benches);
