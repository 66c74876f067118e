use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pyxis_syntax::{parse_module, FileId};

fn benchmark_parse_simple(c: &mut Criterion) {
    let source = "def add(x: int, y: int) -> int:\n    return x + y\n\nresult = add(5, 3)\n";

    c.bench_function("parse_simple", |b| {
        b.iter(|| {
            let file_id = FileId::new(0);
            parse_module(black_box(source), file_id)
        })
    });
}

fn benchmark_parse_complex(c: &mut Criterion) {
    let source = r#"
from typing import Generic, List, Optional, TypeVar

T = TypeVar('T')

class Node(Generic[T]):
    def __init__(self, value: T, next: Optional['Node[T]'] = None) -> None:
        self.value = value
        self.next = next

class Stack(Generic[T]):
    def __init__(self) -> None:
        self.head: Optional[Node[T]] = None
        self.size = 0

    def push(self, value: T) -> None:
        self.head = Node(value, self.head)
        self.size += 1

    def pop(self) -> Optional[T]:
        if self.head is None:
            return None
        node = self.head
        self.head = node.next
        self.size -= 1
        return node.value

def drain(stack: Stack[int]) -> List[int]:
    out: List[int] = []
    while stack.size > 0:
        item = stack.pop()
        if isinstance(item, int):
            out.append(item)
    return out
"#;

    c.bench_function("parse_complex", |b| {
        b.iter(|| {
            let file_id = FileId::new(0);
            parse_module(black_box(source), file_id)
        })
    });
}

fn benchmark_parse_large(c: &mut Criterion) {
    let mut source = String::new();
    for i in 0..200 {
        source.push_str(&format!(
            "def f{i}(x: int) -> int:\n    if x > {i}:\n        return x - {i}\n    return x + {i}\n\n"
        ));
    }

    c.bench_function("parse_200_functions", |b| {
        b.iter(|| {
            let file_id = FileId::new(0);
            parse_module(black_box(&source), file_id)
        })
    });
}

criterion_group!(benches, benchmark_parse_simple, benchmark_parse_complex, benchmark_parse_large);
criterion_main!(benches);
