//! The wide BVH.
//!
//! Build widens each node from a binary SAH split into up to `K` children,
//! packs leaf triangles and lines into SIMD batches, and stores the child
//! bounds of interior nodes in structure-of-arrays form. Traversal keeps a
//! per-thread stack of `(node, entry)` pairs and pushes children
//! farthest-first so the nearest child pops first.

use std::cell::RefCell;
use std::collections::VecDeque;

use ember_core::{BssrdfIntersections, Intersection, MaterialId, Scene, Shape};
use ember_math::simd::LaneHit;
use ember_math::{Aabb, Ray, Vec3};
use log::info;

use super::{Accelerator, LanePack, Pack4, Pack8};
use crate::stats;

/// Leaves stop splitting at this primitive count.
const MAX_PRI_IN_LEAF: usize = 8;
/// Hard depth limit.
const MAX_NODE_DEPTH: usize = 32;
/// SAH bin count per axis.
const SAH_BINS: usize = 16;
/// Cost of one traversal step relative to one primitive test.
const TRAVERSAL_COST: f32 = 0.125;

/// 4-wide BVH.
pub type Qbvh = WideBvh<Pack4>;
/// 8-wide BVH.
pub type Obvh = WideBvh<Pack8>;

enum Node<P: LanePack> {
    Interior {
        boxes: P::Boxes,
        children: Vec<u32>,
    },
    Leaf {
        tris: Vec<P::Tris>,
        lines: Vec<P::Lines>,
        /// Primitive indices without a packed representation.
        others: Vec<u32>,
        count: u32,
    },
}

pub struct WideBvh<P: LanePack> {
    nodes: Vec<Node<P>>,
    root: u32,
    bounds: Aabb,
    depth: usize,
    node_count: usize,
    leaf_count: usize,
}

struct BuildPrim {
    index: u32,
    bounds: Aabb,
    centroid: Vec3,
}

struct Builder<'a, P: LanePack> {
    scene: &'a Scene,
    pri: Vec<BuildPrim>,
    nodes: Vec<Node<P>>,
    depth: usize,
    leaf_count: usize,
    max_pri_in_leaf_seen: usize,
}

impl<P: LanePack> WideBvh<P> {
    pub fn build(scene: &Scene) -> Self {
        let pri: Vec<BuildPrim> = scene
            .primitives
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let bounds = p.shape.bounds();
                BuildPrim {
                    index: i as u32,
                    centroid: bounds.centroid(),
                    bounds,
                }
            })
            .collect();

        let mut bounds = Aabb::EMPTY;
        for p in &pri {
            bounds.union(&p.bounds);
        }

        let mut builder = Builder {
            scene,
            pri,
            nodes: Vec::new(),
            depth: 0,
            leaf_count: 0,
            max_pri_in_leaf_seen: 0,
        };

        let count = builder.pri.len();
        let root = if count == 0 {
            builder.push_leaf(0, 0, 1)
        } else {
            builder.split(0, count, 1)
        };

        info!(
            "built {}-wide BVH: {} nodes, {} leaves, depth {}, {} primitives, max {} in a leaf",
            P::WIDTH,
            builder.nodes.len(),
            builder.leaf_count,
            builder.depth,
            count,
            builder.max_pri_in_leaf_seen,
        );

        Self {
            root,
            bounds,
            depth: builder.depth,
            node_count: builder.nodes.len(),
            leaf_count: builder.leaf_count,
            nodes: builder.nodes,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<P: LanePack> Builder<'_, P> {
    /// Recursively split the primitive range `[start, end)` into a node.
    fn split(&mut self, start: usize, end: usize, depth: usize) -> u32 {
        self.depth = self.depth.max(depth);
        let count = end - start;

        if count <= MAX_PRI_IN_LEAF || depth == MAX_NODE_DEPTH {
            return self.push_leaf(start, end, depth);
        }

        // Widen: keep splitting the pending partitions until K exist or no
        // split is worth taking.
        let mut to_split: VecDeque<(usize, usize)> = VecDeque::new();
        let mut done: Vec<(usize, usize)> = Vec::new();
        to_split.push_back((start, end));

        while let Some((s, e)) = to_split.pop_front() {
            match self.pick_best_split(s, e) {
                Some((axis, pos)) => {
                    let mid = self.partition(s, e, axis, pos);
                    if mid == s || mid == e {
                        done.push((s, e));
                    } else {
                        to_split.push_back((s, mid));
                        to_split.push_back((mid, e));
                    }
                }
                None => done.push((s, e)),
            }
            if to_split.len() + done.len() >= P::WIDTH {
                break;
            }
        }
        done.extend(to_split.drain(..));

        if done.len() == 1 {
            return self.push_leaf(start, end, depth);
        }

        let mut children = Vec::with_capacity(done.len());
        let mut child_bounds = Vec::with_capacity(done.len());
        for (s, e) in done {
            child_bounds.push(self.range_bounds(s, e));
            let child = self.split(s, e, depth + 1);
            children.push(child);
        }

        let boxes = P::pack_boxes(&child_bounds);
        self.nodes.push(Node::Interior { boxes, children });
        (self.nodes.len() - 1) as u32
    }

    fn range_bounds(&self, start: usize, end: usize) -> Aabb {
        let mut b = Aabb::EMPTY;
        for p in &self.pri[start..end] {
            b.union(&p.bounds);
        }
        b
    }

    /// Binned SAH over all three axes; `None` means a leaf is cheaper.
    fn pick_best_split(&self, start: usize, end: usize) -> Option<(usize, f32)> {
        let count = end - start;
        if count < 2 {
            return None;
        }

        let mut centroid_bounds = Aabb::EMPTY;
        for p in &self.pri[start..end] {
            centroid_bounds.grow(p.centroid);
        }
        let parent_area = self.range_bounds(start, end).surface_area().max(1e-8);

        let mut best: Option<(f32, usize, f32)> = None;
        for axis in 0..3 {
            let interval = centroid_bounds.axis_interval(axis);
            let extent = interval.size();
            if extent < 1e-6 {
                continue;
            }

            let mut counts = [0usize; SAH_BINS];
            let mut bounds = [Aabb::EMPTY; SAH_BINS];
            for p in &self.pri[start..end] {
                let c = match axis {
                    0 => p.centroid.x,
                    1 => p.centroid.y,
                    _ => p.centroid.z,
                };
                let bin = (((c - interval.min) / extent * SAH_BINS as f32) as usize)
                    .min(SAH_BINS - 1);
                counts[bin] += 1;
                bounds[bin].union(&p.bounds);
            }

            // Sweep: cost of splitting after each bin boundary.
            let mut right_area = [0.0f32; SAH_BINS];
            let mut right_count = [0usize; SAH_BINS];
            let mut acc = Aabb::EMPTY;
            let mut n = 0;
            for i in (1..SAH_BINS).rev() {
                acc.union(&bounds[i]);
                n += counts[i];
                right_area[i] = if n > 0 { acc.surface_area() } else { 0.0 };
                right_count[i] = n;
            }

            let mut left = Aabb::EMPTY;
            let mut left_n = 0;
            for i in 0..SAH_BINS - 1 {
                left.union(&bounds[i]);
                left_n += counts[i];
                let right_n = right_count[i + 1];
                if left_n == 0 || right_n == 0 {
                    continue;
                }
                let cost = TRAVERSAL_COST
                    + (left.surface_area() * left_n as f32
                        + right_area[i + 1] * right_n as f32)
                        / parent_area;
                let pos = interval.min + extent * (i + 1) as f32 / SAH_BINS as f32;
                if best.is_none_or(|(c, _, _)| cost < c) {
                    best = Some((cost, axis, pos));
                }
            }
        }

        // Splitting must beat testing every primitive in a leaf.
        match best {
            Some((cost, axis, pos)) if cost < count as f32 => Some((axis, pos)),
            _ => None,
        }
    }

    /// Partition `[start, end)` in place by centroid; returns the midpoint.
    fn partition(&mut self, start: usize, end: usize, axis: usize, pos: f32) -> usize {
        let slice = &mut self.pri[start..end];
        let mut mid = 0;
        for i in 0..slice.len() {
            let c = match axis {
                0 => slice[i].centroid.x,
                1 => slice[i].centroid.y,
                _ => slice[i].centroid.z,
            };
            if c < pos {
                slice.swap(i, mid);
                mid += 1;
            }
        }
        start + mid
    }

    /// Pack the range into a leaf: triangles and lines in SIMD batches,
    /// everything else in the scalar fallback list.
    fn push_leaf(&mut self, start: usize, end: usize, depth: usize) -> u32 {
        self.depth = self.depth.max(depth);
        self.leaf_count += 1;
        self.max_pri_in_leaf_seen = self.max_pri_in_leaf_seen.max(end - start);

        let mut tris = Vec::new();
        let mut lines = Vec::new();
        let mut others = Vec::new();
        let mut tri_batch: Vec<(Vec3, Vec3, Vec3, u32)> = Vec::with_capacity(P::WIDTH);
        let mut line_batch: Vec<(Vec3, Vec3, f32, f32, u32)> = Vec::with_capacity(P::WIDTH);

        for p in &self.pri[start..end] {
            match &self.scene.primitives[p.index as usize].shape {
                Shape::Triangle { mesh, face } => {
                    let (v0, v1, v2) = mesh.triangle(*face as usize);
                    tri_batch.push((v0, v1, v2, p.index));
                    if tri_batch.len() == P::WIDTH {
                        tris.push(P::pack_tris(&tri_batch));
                        tri_batch.clear();
                    }
                }
                Shape::Line { p0, p1, w0, w1 } => {
                    line_batch.push((*p0, *p1, *w0, *w1, p.index));
                    if line_batch.len() == P::WIDTH {
                        lines.push(P::pack_lines(&line_batch));
                        line_batch.clear();
                    }
                }
                _ => others.push(p.index),
            }
        }
        if !tri_batch.is_empty() {
            tris.push(P::pack_tris(&tri_batch));
        }
        if !line_batch.is_empty() {
            lines.push(P::pack_lines(&line_batch));
        }

        self.nodes.push(Node::Leaf {
            tris,
            lines,
            others,
            count: (end - start) as u32,
        });
        (self.nodes.len() - 1) as u32
    }
}

thread_local! {
    // Traversal stack, sized once per thread and reused across queries.
    static STACK: RefCell<Vec<(u32, f32)>> =
        RefCell::new(Vec::with_capacity(MAX_NODE_DEPTH * 8));
}

/// Re-run the scalar intersection of the winning lane so the record carries
/// full shading attributes. The lane `t` relaxes the bound slightly to
/// absorb rounding differences between the packed and scalar paths.
fn refine(scene: &Scene, ray: &Ray, hit: LaneHit, isect: &mut Intersection) {
    let prim = &scene.primitives[hit.prim as usize];
    let saved = isect.t;
    isect.t = hit.t + hit.t.abs() * 1e-4 + 1e-6;
    if prim.shape.intersect(ray, isect) {
        isect.primitive = Some(hit.prim);
    } else {
        isect.t = saved;
    }
}

impl<P: LanePack> Accelerator for WideBvh<P> {
    fn intersect(&self, scene: &Scene, ray: &Ray) -> Intersection {
        stats::rays(1);
        let mut isect = Intersection::default();

        let fmin = self.bounds.intersect(ray);
        if fmin < 0.0 {
            return isect;
        }
        let pack = P::make_ray(ray);

        STACK.with(|stack| {
            let stack = &mut *stack.borrow_mut();
            stack.clear();
            stack.push((self.root, fmin));

            while let Some((node, t_entry)) = stack.pop() {
                // A closer hit has been found since this entry was pushed.
                if isect.t < t_entry {
                    continue;
                }
                match &self.nodes[node as usize] {
                    Node::Leaf {
                        tris,
                        lines,
                        others,
                        count,
                    } => {
                        stats::intersection_tests(*count as u64);
                        for batch in tris {
                            if let Some(hit) = P::intersect_tris(batch, &pack, isect.t) {
                                refine(scene, ray, hit, &mut isect);
                            }
                        }
                        for batch in lines {
                            if let Some(hit) = P::intersect_lines(batch, &pack, isect.t) {
                                refine(scene, ray, hit, &mut isect);
                            }
                        }
                        for &pi in others {
                            if scene.primitives[pi as usize].shape.intersect(ray, &mut isect)
                            {
                                isect.primitive = Some(pi);
                            }
                        }
                    }
                    Node::Interior { boxes, children } => {
                        let (mask, t_near) = P::intersect_boxes(boxes, &pack, isect.t);
                        if mask == 0 {
                            continue;
                        }

                        if mask.count_ones() == 1 {
                            // Single-hit fast path.
                            let k = mask.trailing_zeros() as usize;
                            stack.push((children[k], t_near[k]));
                        } else if mask.count_ones() == 2 {
                            // Two-hit fast path: farther child first.
                            let k0 = mask.trailing_zeros() as usize;
                            let k1 =
                                (mask & (mask - 1)).trailing_zeros() as usize;
                            if t_near[k0] < t_near[k1] {
                                stack.push((children[k1], t_near[k1]));
                                stack.push((children[k0], t_near[k0]));
                            } else {
                                stack.push((children[k0], t_near[k0]));
                                stack.push((children[k1], t_near[k1]));
                            }
                        } else {
                            // Generic case: repeatedly push the farthest
                            // remaining child.
                            let mut remaining = mask;
                            while remaining != 0 {
                                let mut k = usize::MAX;
                                let mut far = -1.0f32;
                                let mut probe = remaining;
                                while probe != 0 {
                                    let j = probe.trailing_zeros() as usize;
                                    if t_near[j] > far {
                                        far = t_near[j];
                                        k = j;
                                    }
                                    probe &= probe - 1;
                                }
                                stack.push((children[k], t_near[k]));
                                remaining &= !(1 << k);
                            }
                        }
                    }
                }
            }
        });

        isect
    }

    fn is_occluded(&self, scene: &Scene, ray: &Ray) -> bool {
        stats::rays(1);
        stats::shadow_rays(1);

        if self.bounds.intersect(ray) < 0.0 {
            return false;
        }
        let pack = P::make_ray(ray);

        STACK.with(|stack| {
            let stack = &mut *stack.borrow_mut();
            stack.clear();
            stack.push((self.root, 0.0));

            while let Some((node, _)) = stack.pop() {
                match &self.nodes[node as usize] {
                    Node::Leaf {
                        tris,
                        lines,
                        others,
                        count,
                    } => {
                        stats::intersection_tests(*count as u64);
                        for batch in tris {
                            if P::tris_any(batch, &pack, ray.t_max) {
                                return true;
                            }
                        }
                        for batch in lines {
                            if P::lines_any(batch, &pack, ray.t_max) {
                                return true;
                            }
                        }
                        for &pi in others {
                            if scene.primitives[pi as usize].shape.intersect_p(ray) {
                                return true;
                            }
                        }
                    }
                    Node::Interior { boxes, children } => {
                        // No ordering needed for occlusion.
                        let (mask, _) = P::intersect_boxes(boxes, &pack, ray.t_max);
                        let mut remaining = mask;
                        while remaining != 0 {
                            let k = remaining.trailing_zeros() as usize;
                            stack.push((children[k], 0.0));
                            remaining &= remaining - 1;
                        }
                    }
                }
            }
            false
        })
    }

    fn intersect_multi(
        &self,
        scene: &Scene,
        ray: &Ray,
        material: MaterialId,
        out: &mut BssrdfIntersections,
    ) {
        stats::rays(1);

        let fmin = self.bounds.intersect(ray);
        if fmin < 0.0 {
            return;
        }
        let pack = P::make_ray(ray);

        STACK.with(|stack| {
            let stack = &mut *stack.borrow_mut();
            stack.clear();
            stack.push((self.root, fmin));

            while let Some((node, t_entry)) = stack.pop() {
                if out.max_t() < t_entry {
                    continue;
                }
                match &self.nodes[node as usize] {
                    Node::Leaf { tris, count, .. } => {
                        // Subsurface scattering lives on triangle geometry;
                        // lines carry hair shaders and analytic shapes have
                        // no interior to probe.
                        stats::intersection_tests(*count as u64);
                        for batch in tris {
                            P::tris_each(batch, &pack, out.max_t(), &mut |hit| {
                                let prim = &scene.primitives[hit.prim as usize];
                                if prim.material != material {
                                    return;
                                }
                                let mut isect = Intersection {
                                    t: hit.t + hit.t.abs() * 1e-4 + 1e-6,
                                    ..Default::default()
                                };
                                if prim.shape.intersect(ray, &mut isect) {
                                    isect.primitive = Some(hit.prim);
                                    out.add(isect);
                                }
                            });
                        }
                    }
                    Node::Interior { boxes, children } => {
                        let (mask, t_near) = P::intersect_boxes(boxes, &pack, out.max_t());
                        let mut remaining = mask;
                        while remaining != 0 {
                            let mut k = usize::MAX;
                            let mut far = -1.0f32;
                            let mut probe = remaining;
                            while probe != 0 {
                                let j = probe.trailing_zeros() as usize;
                                if t_near[j] > far {
                                    far = t_near[j];
                                    k = j;
                                }
                                probe &= probe - 1;
                            }
                            stack.push((children[k], t_near[k]));
                            remaining &= !(1 << k);
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::LinearList;
    use ember_core::camera::PerspectiveCamera;
    use ember_core::{Material, Mesh, Primitive};
    use ember_core::material::Closure;
    use ember_core::Spectrum;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn test_camera() -> PerspectiveCamera {
        PerspectiveCamera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 1.0, 8, 8)
    }

    /// A soup of uniformly random triangles inside the unit-ish cube.
    fn triangle_soup(count: usize, seed: u64) -> Scene {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut positions = Vec::with_capacity(count * 3);
        let mut indices = Vec::with_capacity(count * 3);
        for i in 0..count {
            let base = Vec3::new(
                rng.random::<f32>() * 10.0 - 5.0,
                rng.random::<f32>() * 10.0 - 5.0,
                rng.random::<f32>() * 10.0 - 5.0,
            );
            for _ in 0..3 {
                positions.push(
                    base + Vec3::new(rng.random(), rng.random(), rng.random()) - 0.5,
                );
            }
            indices.extend_from_slice(&[(i * 3) as u32, (i * 3 + 1) as u32, (i * 3 + 2) as u32]);
        }
        let mesh = Arc::new(Mesh::new(positions, indices));

        let mut scene = Scene::new(test_camera());
        for face in 0..count {
            scene.add_primitive(Primitive::new(
                Shape::Triangle {
                    mesh: mesh.clone(),
                    face: face as u32,
                },
                0,
            ));
        }
        scene
    }

    fn random_ray(rng: &mut StdRng) -> Ray {
        let origin = Vec3::new(
            rng.random::<f32>() * 16.0 - 8.0,
            rng.random::<f32>() * 16.0 - 8.0,
            rng.random::<f32>() * 16.0 - 8.0,
        );
        let dir = ember_math::sampling::uniform_sample_sphere(rng.random(), rng.random());
        Ray::spawn(origin, dir)
    }

    fn check_against_oracle<A: Accelerator>(accel: &A, scene: &Scene, rays: usize, seed: u64) {
        let oracle = LinearList;
        let mut rng = StdRng::seed_from_u64(seed);
        for i in 0..rays {
            let ray = random_ray(&mut rng);
            let fast = accel.intersect(scene, &ray);
            let slow = oracle.intersect(scene, &ray);
            assert_eq!(
                fast.is_hit(),
                slow.is_hit(),
                "hit disagreement on ray {i}: {ray:?}"
            );
            if fast.is_hit() {
                assert!(
                    (fast.t - slow.t).abs() < 1e-5 * slow.t.max(1.0),
                    "t disagreement on ray {i}: {} vs {}",
                    fast.t,
                    slow.t
                );
            }
            // Any-hit must agree with nearest-hit existence.
            assert_eq!(accel.is_occluded(scene, &ray), slow.is_hit(), "ray {i}");
        }
    }

    #[test]
    fn test_qbvh_matches_brute_force() {
        let scene = triangle_soup(2000, 11);
        let bvh = Qbvh::build(&scene);
        assert!(bvh.node_count() > 1);
        check_against_oracle(&bvh, &scene, 500, 13);
    }

    #[test]
    fn test_obvh_matches_brute_force() {
        let scene = triangle_soup(2000, 17);
        let bvh = Obvh::build(&scene);
        check_against_oracle(&bvh, &scene, 500, 19);
    }

    #[test]
    fn test_mixed_shapes_fallback() {
        // Spheres have no packed path and must go through the scalar
        // fallback list.
        let mut scene = triangle_soup(64, 23);
        let mut rng = StdRng::seed_from_u64(29);
        for _ in 0..64 {
            scene.add_primitive(Primitive::new(
                Shape::Sphere {
                    center: Vec3::new(
                        rng.random::<f32>() * 10.0 - 5.0,
                        rng.random::<f32>() * 10.0 - 5.0,
                        rng.random::<f32>() * 10.0 - 5.0,
                    ),
                    radius: 0.4,
                },
                0,
            ));
        }
        let bvh = Qbvh::build(&scene);
        check_against_oracle(&bvh, &scene, 300, 31);
    }

    #[test]
    fn test_line_primitives() {
        let mut scene = Scene::new(test_camera());
        let mut rng = StdRng::seed_from_u64(37);
        for _ in 0..40 {
            let p0 = Vec3::new(
                rng.random::<f32>() * 4.0 - 2.0,
                rng.random::<f32>() * 4.0 - 2.0,
                rng.random::<f32>() * 4.0 - 2.0,
            );
            let p1 = p0 + Vec3::new(rng.random(), rng.random(), rng.random());
            scene.add_primitive(Primitive::new(
                Shape::Line {
                    p0,
                    p1,
                    w0: 0.05,
                    w1: 0.02,
                },
                0,
            ));
        }
        let bvh = Qbvh::build(&scene);
        check_against_oracle(&bvh, &scene, 300, 41);
    }

    #[test]
    fn test_multi_hit_collects_by_material() {
        // A stack of parallel triangles along +Z, alternating materials.
        let mut scene = Scene::new(test_camera());
        let skin = scene.add_material(Material::new(
            "skin",
            Closure::Lambert {
                albedo: Spectrum::splat(0.5),
            },
        ));
        let other = scene.add_material(Material::new(
            "other",
            Closure::Lambert {
                albedo: Spectrum::splat(0.5),
            },
        ));
        let mut positions = Vec::new();
        let mut indices = Vec::new();
        for i in 0..8 {
            let z = i as f32;
            let b = positions.len() as u32;
            positions.extend_from_slice(&[
                Vec3::new(-2.0, -2.0, z),
                Vec3::new(2.0, -2.0, z),
                Vec3::new(0.0, 2.0, z),
            ]);
            indices.extend_from_slice(&[b, b + 1, b + 2]);
        }
        let mesh = Arc::new(Mesh::new(positions, indices));
        for face in 0..8u32 {
            let material = if face % 2 == 0 { skin } else { other };
            scene.add_primitive(Primitive::new(
                Shape::Triangle {
                    mesh: mesh.clone(),
                    face,
                },
                material,
            ));
        }

        let bvh = Qbvh::build(&scene);
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, -2.0), Vec3::Z);
        let mut bag = BssrdfIntersections::new();
        bvh.intersect_multi(&scene, &ray, skin, &mut bag);

        // Four matching faces but the bag holds four; all kept hits carry
        // the requested material.
        assert_eq!(bag.len(), 4);
        for hit in bag.hits() {
            let prim = hit.primitive.unwrap() as usize;
            assert_eq!(scene.primitives[prim].material, skin);
        }

        // With more matches than capacity, the nearest survive.
        let far_material = skin;
        let mut bag = BssrdfIntersections::new();
        let ray = Ray::spawn(Vec3::new(0.0, 0.0, -20.0), Vec3::Z);
        bvh.intersect_multi(&scene, &ray, far_material, &mut bag);
        assert_eq!(bag.len(), 4);
    }

    #[test]
    fn test_empty_scene() {
        let scene = Scene::new(test_camera());
        let bvh = Qbvh::build(&scene);
        let ray = Ray::spawn(Vec3::ZERO, Vec3::Z);
        assert!(!bvh.intersect(&scene, &ray).is_hit());
        assert!(!bvh.is_occluded(&scene, &ray));
    }
}
