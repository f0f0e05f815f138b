//! Dearraying: arranging detected cores into the rows and columns of the array.
//!
//! Rows are traced along Delaunay edges that run roughly along the row
//! direction. Gaps left by missing cores are filled with imaginary cells one
//! core spacing apart.

use crate::common::*;
use delaunator::{triangulate, Point};

/// Parameters of the row tracing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct GridInit {
    /// Edges longer than the median length plus this many median absolute
    /// deviations are dropped.
    #[derivative(Default(value = "r64(1.5)"))]
    pub threshold_multiplier: R64,
    /// The largest deviation in degrees of a row edge from the row direction.
    #[derivative(Default(value = "r64(10.0)"))]
    pub threshold_angle: R64,
    /// The row direction in degrees from the image x-axis, clockwise in image
    /// coordinates.
    #[derivative(Default(value = "r64(0.0)"))]
    pub origin_angle: R64,
    /// Search radius for the next core after a gap, relative to the spacing.
    #[derivative(Default(value = "r64(0.6)"))]
    pub radius_multiplier: R64,
    /// Distance to the right end at which a row stops, relative to the spacing.
    #[derivative(Default(value = "r64(0.75)"))]
    pub gamma_multiplier: R64,
    /// Extent of the array beyond the rightmost core, relative to the spacing.
    #[derivative(Default(value = "r64(1.5)"))]
    pub width_multiplier: R64,
    /// The core-to-core spacing in pixels. Estimated from the row edges if unset.
    pub spacing: Option<R64>,
}

impl GridInit {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.threshold_multiplier >= 0.0,
            "threshold_multiplier must be non-negative, but get {}",
            self.threshold_multiplier
        );
        ensure!(
            (0.0..90.0).contains(&self.threshold_angle.raw()),
            "threshold_angle must be in range [0, 90), but get {}",
            self.threshold_angle
        );
        ensure!(
            self.origin_angle.abs() < 90.0,
            "origin_angle must be in range (-90, 90), but get {}",
            self.origin_angle
        );
        ensure!(
            self.radius_multiplier > 0.0,
            "radius_multiplier must be positive, but get {}",
            self.radius_multiplier
        );
        ensure!(
            self.gamma_multiplier > 0.0 && self.gamma_multiplier < self.width_multiplier,
            "expect 0 < gamma_multiplier < width_multiplier, but get {} and {}",
            self.gamma_multiplier,
            self.width_multiplier
        );
        if let Some(spacing) = self.spacing {
            ensure!(spacing > 0.0, "spacing must be positive, but get {}", spacing);
        }
        Ok(())
    }
}

/// A position of the array, either holding a detected core or left empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    /// Index of the core in the input, or `None` for an imaginary cell.
    pub core: Option<usize>,
}

impl GridCell {
    pub fn is_imaginary(&self) -> bool {
        self.core.is_none()
    }

    pub fn to_record(&self, cores: &[Core]) -> GridRecord {
        GridRecord {
            x: self.x,
            y: self.y,
            radius: self.core.map(|index| cores[index].radius()),
            row: self.row,
            col: self.col,
            imaginary: self.is_imaginary(),
        }
    }
}

/// A grid cell as written to the output JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    pub row: usize,
    pub col: usize,
    pub imaginary: bool,
}

/// A directed edge between core indices. Start and end are equal for a core
/// with no row neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Link {
    start: usize,
    end: usize,
}

impl Link {
    fn is_isolated(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell {
    Real(usize),
    Imaginary([f64; 2]),
}

/// Assigns every core a row and a column, adding imaginary cells for gaps.
///
/// Cells are returned in row-major order. Rows are ordered from top to bottom
/// perpendicular to the row direction. Every core appears exactly once.
pub fn dearray(cores: &[Core], init: &GridInit) -> Result<Vec<GridCell>> {
    init.validate()?;

    match cores.len() {
        0 => return Ok(vec![]),
        1 => {
            return Ok(vec![GridCell {
                row: 0,
                col: 0,
                x: cores[0].x(),
                y: cores[0].y(),
                core: Some(0),
            }])
        }
        _ => {}
    }

    let min_x = cores.iter().map(|core| core.x()).fold(f64::INFINITY, f64::min);
    let min_y = cores.iter().map(|core| core.y()).fold(f64::INFINITY, f64::min);
    let points: Vec<[f64; 2]> = cores
        .iter()
        .map(|core| [core.x() - min_x, core.y() - min_y])
        .collect();

    let edges = triangle_edges(&points);
    let edges = filter_by_length(&edges, &points, init.threshold_multiplier.raw());
    let row_edges = filter_by_angle(&edges, &points, init);
    let links = limit_connections(&row_edges, &points);

    // fall back to all short edges when no row edge survives
    let spacing = match init.spacing {
        Some(spacing) => spacing.raw(),
        None => {
            let lengths = |links: &[Link]| -> Vec<f64> {
                links.iter().map(|link| link_length(link, &points)).collect()
            };
            median(&lengths(links.as_slice()))
                .or_else(|| median(&lengths(edges.as_slice())))
                .context("unable to estimate the core spacing")?
        }
    };
    ensure!(
        spacing > 0.0,
        "core spacing must be positive, but get {}",
        spacing
    );
    debug!(
        "trace rows over {} row edges with spacing {:.2}",
        links.len(),
        spacing
    );
    let links = add_isolated(links, points.len());

    let rows = travel(links, &points, spacing, init);
    let cells = assemble(rows, &points, init.origin_angle.raw().to_radians())
        .into_iter()
        .map(|mut cell| {
            cell.x += min_x;
            cell.y += min_y;
            cell
        })
        .collect();
    Ok(cells)
}

fn distance(lhs: [f64; 2], rhs: [f64; 2]) -> f64 {
    (lhs[0] - rhs[0]).hypot(lhs[1] - rhs[1])
}

fn link_length(link: &Link, points: &[[f64; 2]]) -> f64 {
    distance(points[link.start], points[link.end])
}

fn median(values: &[f64]) -> Option<f64> {
    let sorted: Vec<f64> = values
        .iter()
        .copied()
        .sorted_by(|lhs, rhs| lhs.total_cmp(rhs))
        .collect();
    let len = sorted.len();
    match len {
        0 => None,
        _ if len % 2 == 1 => Some(sorted[len / 2]),
        _ => Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0),
    }
}

/// Unique edges of the Delaunay triangulation, with the smaller index first.
///
/// Collinear points have no triangulation, so every pair is taken instead.
fn triangle_edges(points: &[[f64; 2]]) -> Vec<Link> {
    let vertices: Vec<Point> = points.iter().map(|&[x, y]| Point { x, y }).collect();
    let triangulation = triangulate(&vertices);

    let edges: BTreeSet<Link> = if triangulation.triangles.is_empty() {
        (0..points.len())
            .tuple_combinations()
            .map(|(start, end)| Link { start, end })
            .collect()
    } else {
        triangulation
            .triangles
            .chunks(3)
            .flat_map(|triangle| {
                (0..triangle.len()).map(move |index| {
                    let lhs = triangle[index];
                    let rhs = triangle[(index + 1) % triangle.len()];
                    Link {
                        start: lhs.min(rhs),
                        end: lhs.max(rhs),
                    }
                })
            })
            .collect()
    };
    edges.into_iter().collect()
}

/// Keeps edges no longer than the median plus a multiple of the median
/// absolute deviation, directed to point rightward.
fn filter_by_length(edges: &[Link], points: &[[f64; 2]], multiplier: f64) -> Vec<Link> {
    let lengths: Vec<f64> = edges.iter().map(|link| link_length(link, points)).collect();
    let center = match median(&lengths) {
        Some(center) => center,
        None => return vec![],
    };
    let deviations: Vec<f64> = lengths.iter().map(|len| (len - center).abs()).collect();
    let mad = median(&deviations).unwrap_or(0.0);
    let upper = center + multiplier * mad;

    izip!(edges, &lengths)
        .filter(|(_, &len)| len <= upper)
        .map(|(link, _)| {
            if points[link.start][0] > points[link.end][0] {
                Link {
                    start: link.end,
                    end: link.start,
                }
            } else {
                *link
            }
        })
        .collect()
}

fn filter_by_angle(edges: &[Link], points: &[[f64; 2]], init: &GridInit) -> Vec<Link> {
    let origin = init.origin_angle.raw();
    let threshold = init.threshold_angle.raw();
    edges
        .iter()
        .filter(|link| {
            let [sx, sy] = points[link.start];
            let [ex, ey] = points[link.end];
            let angle = (ey - sy).atan2(ex - sx).to_degrees();
            (angle - origin).abs() <= threshold
        })
        .copied()
        .collect()
}

/// Keeps an edge only if its ends are each other's closest left and right
/// neighbors.
fn limit_connections(edges: &[Link], points: &[[f64; 2]]) -> Vec<Link> {
    let mut left: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
    let mut right: BTreeMap<usize, (usize, f64)> = BTreeMap::new();

    let update = |side: &mut BTreeMap<usize, (usize, f64)>, from: usize, to: usize, len: f64| {
        let closer = side.get(&from).map_or(true, |&(_, best)| len < best);
        if closer {
            side.insert(from, (to, len));
        }
    };

    for link in edges {
        let len = link_length(link, points);
        let (lhs, rhs) = (link.start, link.end);
        if points[lhs][0] < points[rhs][0] {
            update(&mut right, lhs, rhs, len);
            update(&mut left, rhs, lhs, len);
        } else if points[lhs][0] > points[rhs][0] {
            update(&mut right, rhs, lhs, len);
            update(&mut left, lhs, rhs, len);
        }
    }

    right
        .iter()
        .filter(|(&start, &(end, _))| left.get(&end).map_or(false, |&(back, _)| back == start))
        .map(|(&start, &(end, _))| Link { start, end })
        .collect()
}

fn add_isolated(mut links: Vec<Link>, num_points: usize) -> Vec<Link> {
    let linked: BTreeSet<usize> = links
        .iter()
        .flat_map(|link| [link.start, link.end])
        .collect();
    links.extend(
        (0..num_points)
            .filter(|index| !linked.contains(index))
            .map(|index| Link {
                start: index,
                end: index,
            }),
    );
    links
}

/// Traces rows from the leftmost unvisited link.
///
/// A row follows chained links. Past a chain end it looks for a link starting
/// within the search radius, and otherwise steps one spacing along the row
/// direction with an imaginary cell. It stops near the right end of the array.
fn travel(
    mut links: Vec<Link>,
    points: &[[f64; 2]],
    spacing: f64,
    init: &GridInit,
) -> Vec<Vec<Cell>> {
    let theta = init.origin_angle.raw().to_radians();
    let step = [spacing * theta.cos(), spacing * theta.sin()];
    let max_x = points
        .iter()
        .map(|point| point[0])
        .fold(f64::NEG_INFINITY, f64::max);
    let stop_x = max_x + (init.width_multiplier.raw() - init.gamma_multiplier.raw()) * spacing;
    let radius = init.radius_multiplier.raw() * spacing;

    let mut rows = vec![];

    while let Some(first) = links
        .iter()
        .position_min_by(|lhs, rhs| points[lhs.start][0].total_cmp(&points[rhs.start][0]))
    {
        let first = links.remove(first);
        let mut row = vec![];
        let mut current = Cell::Real(first.start);
        let mut pos = points[first.start];
        if !first.is_isolated() {
            row.push(current);
            current = Cell::Real(first.end);
            pos = points[first.end];
        }

        loop {
            let chained = links
                .iter()
                .position(|link| distance(points[link.start], pos) < 1e-3);
            let next = chained.or_else(|| {
                if pos[0] >= stop_x {
                    return None;
                }
                links
                    .iter()
                    .enumerate()
                    .map(|(index, link)| (index, distance(points[link.start], pos)))
                    .filter(|&(_, dist)| dist <= radius)
                    .min_by(|lhs, rhs| lhs.1.total_cmp(&rhs.1))
                    .map(|(index, _)| index)
            });

            match next {
                Some(index) => {
                    let link = links.remove(index);
                    match current {
                        Cell::Imaginary(_) => current = Cell::Real(link.start),
                        Cell::Real(core) if core != link.start => {
                            row.push(current);
                            current = Cell::Real(link.start);
                        }
                        Cell::Real(_) => {}
                    }
                    pos = points[link.start];
                    if !link.is_isolated() {
                        row.push(current);
                        current = Cell::Real(link.end);
                        pos = points[link.end];
                    }
                }
                None if pos[0] >= stop_x => {
                    if let Cell::Real(_) = current {
                        row.push(current);
                    }
                    break;
                }
                None => {
                    row.push(current);
                    pos = [pos[0] + step[0], pos[1] + step[1]];
                    current = Cell::Imaginary(pos);
                }
            }
        }

        rows.push(row);
    }

    rows
}

/// Orders rows top to bottom and numbers the cells. A core reached by more
/// than one row keeps its first placement.
fn assemble(mut rows: Vec<Vec<Cell>>, points: &[[f64; 2]], theta: f64) -> Vec<GridCell> {
    let position = |cell: &Cell| match *cell {
        Cell::Real(index) => points[index],
        Cell::Imaginary(pos) => pos,
    };
    let row_key = |row: &Vec<Cell>| {
        row.first().map_or(0.0, |cell| {
            let [x, y] = position(cell);
            y * theta.cos() - x * theta.sin()
        })
    };
    rows.sort_by(|lhs, rhs| row_key(lhs).total_cmp(&row_key(rhs)));

    let mut placed = vec![false; points.len()];
    let mut cells = vec![];
    let mut row_index = 0;

    for row in rows {
        let mut kept = vec![];
        for cell in row {
            if let Cell::Real(index) = cell {
                if placed[index] {
                    continue;
                }
                placed[index] = true;
            }
            kept.push(cell);
        }
        if !kept.iter().any(|cell| matches!(cell, Cell::Real(_))) {
            continue;
        }

        cells.extend(kept.iter().enumerate().map(|(col, cell)| {
            let [x, y] = position(cell);
            GridCell {
                row: row_index,
                col,
                x,
                y,
                core: match *cell {
                    Cell::Real(index) => Some(index),
                    Cell::Imaginary(_) => None,
                },
            }
        }));
        row_index += 1;
    }

    cells
}
