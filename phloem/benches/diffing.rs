use divan::{Bencher, black_box};
use phloem::{Node, Tree, diff, reconcile_children};

fn main() {
    divan::main();
}

fn row(i: usize, label: &str) -> Node {
    Node::element("tr")
        .with_key(i as i64)
        .with_attr("class", if i % 2 == 0 { "even" } else { "odd" })
        .with_child(Node::element("td").with_child(Node::text(i.to_string())))
        .with_child(Node::element("td").with_child(Node::text(format!("{label} {i}"))))
}

fn table(rows: impl IntoIterator<Item = usize>, label: &str) -> Node {
    Node::element("table").with_child(Node::element("tbody").with_children(rows.into_iter().map(|i| row(i, label))))
}

const SIZES: &[usize] = &[100, 1_000, 10_000];

// Nothing changed
#[divan::bench(args = SIZES)]
fn identical(bencher: Bencher, n: usize) {
    let old = table(0..n, "row");
    let new = old.clone();
    bencher.bench_local(|| black_box(diff(black_box(Some(&old)), black_box(Some(&new)))));
}

// Every label changes
#[divan::bench(args = SIZES)]
fn update_every_row(bencher: Bencher, n: usize) {
    let old = table(0..n, "row");
    let new = table(0..n, "item");
    bencher.bench_local(|| black_box(diff(Some(&old), Some(&new))));
}

#[divan::bench(args = SIZES)]
fn prepend_one(bencher: Bencher, n: usize) {
    let old = table(0..n, "row");
    let new = table(core::iter::once(n).chain(0..n), "row");
    bencher.bench_local(|| black_box(diff(Some(&old), Some(&new))));
}

#[divan::bench(args = SIZES)]
fn swap_two(bencher: Bencher, n: usize) {
    let old = table(0..n, "row");
    let mut order: Vec<usize> = (0..n).collect();
    order.swap(1, n - 2);
    let new = table(order, "row");
    bencher.bench_local(|| black_box(diff(Some(&old), Some(&new))));
}

#[divan::bench(args = SIZES)]
fn append_many(bencher: Bencher, n: usize) {
    let old = table(0..n, "row");
    let new = table(0..2 * n, "row");
    bencher.bench_local(|| black_box(diff(Some(&old), Some(&new))));
}

// Every child except the old last one moves
#[divan::bench(args = SIZES)]
fn reverse(bencher: Bencher, n: usize) {
    let old: Vec<_> = (0..n).map(|i| row(i, "row")).collect();
    let new: Vec<_> = (0..n).rev().map(|i| row(i, "row")).collect();
    bencher.bench_local(|| black_box(reconcile_children(&old, &new)));
}

// Arena construction only
#[divan::bench(args = SIZES)]
fn build_tree(bencher: Bencher, n: usize) {
    let node = table(0..n, "row");
    bencher.bench_local(|| black_box(Tree::from_node(black_box(&node))));
}
