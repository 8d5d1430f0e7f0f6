use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fiber_core::{children, create_element, Child, Element, Props};
use fiber_testing::RenderTestRule;

const SECTION_COUNT: usize = 4;
const ROW_SAMPLES: &[usize] = &[8, 32, 128];

fn wide_tree(sections: usize, rows_per_section: usize, revision: usize) -> Element {
    let sections: Vec<Child> = (0..sections)
        .map(|section| {
            let rows: Vec<Child> = (0..rows_per_section)
                .map(|row| {
                    create_element(
                        "li",
                        Props::new().with("data-revision", revision as i64),
                        children![format!("Item {section}-{row}")],
                    )
                    .into()
                })
                .collect();
            create_element(
                "section",
                Props::new(),
                vec![
                    create_element("h2", Props::new(), children![format!("Section {section}")]).into(),
                    create_element("ul", Props::new(), rows).into(),
                ],
            )
            .into()
        })
        .collect();
    create_element("main", Props::new(), sections)
}

fn host_node_count(sections: usize, rows_per_section: usize) -> usize {
    1 + sections * (4 + rows_per_section * 2)
}

fn bench_first_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_render");
    for &rows in ROW_SAMPLES {
        group.bench_with_input(
            BenchmarkId::from_parameter(host_node_count(SECTION_COUNT, rows)),
            &rows,
            |b, &rows| {
                let element = wide_tree(SECTION_COUNT, rows, 0);
                b.iter(|| {
                    let mut rule = RenderTestRule::new();
                    rule.set_content(element.clone()).expect("render");
                    black_box(rule.root_id());
                });
            },
        );
    }
    group.finish();
}

fn bench_update_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_render");
    for &rows in ROW_SAMPLES {
        group.bench_with_input(
            BenchmarkId::from_parameter(host_node_count(SECTION_COUNT, rows)),
            &rows,
            |b, &rows| {
                let mut rule = RenderTestRule::new();
                rule.set_content(wide_tree(SECTION_COUNT, rows, 0))
                    .expect("render");
                let mut revision = 0;
                b.iter(|| {
                    revision += 1;
                    rule.set_content(wide_tree(SECTION_COUNT, rows, revision))
                        .expect("rerender");
                    black_box(rule.take_ops().len());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(reconcile, bench_first_render, bench_update_render);
criterion_main!(reconcile);
