use std::io::Write;

use anyhow::Result;
use cubex_core::{CallNode, Conversion, CubeValue, CubexArchive, MetricValues, ValueOps};
use serde::Serialize;

#[derive(Serialize)]
struct Row<'a> {
    cnode: u64,
    region: &'a str,
    depth: usize,
    value: CubeValue,
    values: Vec<CubeValue>,
}

/// Call nodes in pre-order with their depth.
fn with_depth(roots: &[CallNode]) -> Vec<(&CallNode, usize)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&CallNode, usize)> = roots.iter().rev().map(|c| (c, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        out.push((node, depth));
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }
    out
}

fn region_name<'a>(archive: &'a CubexArchive, cnode: &CallNode) -> &'a str {
    archive.region(cnode).map_or("<unknown>", |r| r.name.as_str())
}

pub fn write_calltree(out: &mut impl Write, archive: &CubexArchive) -> Result<()> {
    out.write_all(archive.calltree().as_bytes())?;
    Ok(())
}

pub fn write_values(
    out: &mut impl Write,
    archive: &CubexArchive,
    values: &MetricValues,
    conversion: Conversion,
) -> Result<()> {
    writeln!(
        out,
        "# {} ({}, {} locations)",
        values.metric_name(),
        values.metric_type(),
        values.num_locations()
    )?;
    for (cnode, depth) in with_depth(archive.root_cnodes()) {
        let value = values.value(cnode, conversion).to_scalar();
        writeln!(
            out,
            "{}{}\t{}",
            "-".repeat(depth),
            region_name(archive, cnode),
            value
        )?;
    }
    Ok(())
}

pub fn write_values_json(
    out: &mut impl Write,
    archive: &CubexArchive,
    values: &MetricValues,
    conversion: Conversion,
) -> Result<()> {
    let rows: Vec<Row<'_>> = with_depth(archive.root_cnodes())
        .into_iter()
        .map(|(cnode, depth)| Row {
            cnode: cnode.id,
            region: region_name(archive, cnode),
            depth,
            value: values.value(cnode, conversion),
            values: values.cnode_values(cnode, conversion),
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    writeln!(out)?;
    Ok(())
}
