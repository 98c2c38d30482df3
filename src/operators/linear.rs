//! Stateless linear operators (spec §4.5): map, filter, negate, concat,
//! plus the two passthroughs `output` and `debug`.

use crate::error::ExecError;
use crate::graph::{GraphBuilder, Operator, OperatorId, Reader, Writer};
use std::fmt;

pub struct Map<A, B, F> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<B>,
    f: F,
}

impl<A, B, F> Map<A, B, F>
where
    A: Clone + 'static,
    B: Clone + 'static,
    F: FnMut(&A) -> B + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>, f: F) -> Reader<B> {
        let id = builder.alloc_id();
        let mut writer: Writer<B> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Map {
            id,
            input,
            output: writer,
            f,
        }));
        out
    }
}

impl<A, B, F> Operator for Map<A, B, F>
where
    A: Clone,
    B: Clone,
    F: FnMut(&A) -> B,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            self.output.send(ms.map(&mut self.f));
        }
        Ok(())
    }
}

/// Like [`Map`], but `f` can fail (the expression evaluator's compiled
/// closures do). A failure propagates out of `run()` immediately, per the
/// engine's error-propagation rule (spec §7) — operators downstream of
/// the point of failure simply never see this round's output.
pub struct TryMap<A, B, F> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<B>,
    f: F,
}

impl<A, B, F> TryMap<A, B, F>
where
    A: Clone + 'static,
    B: Clone + 'static,
    F: FnMut(&A) -> Result<B, ExecError> + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>, f: F) -> Reader<B> {
        let id = builder.alloc_id();
        let mut writer: Writer<B> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(TryMap {
            id,
            input,
            output: writer,
            f,
        }));
        out
    }
}

impl<A, B, F> Operator for TryMap<A, B, F>
where
    A: Clone,
    B: Clone,
    F: FnMut(&A) -> Result<B, ExecError>,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            let mut out = Vec::with_capacity(ms.len());
            for (v, m) in ms.into_inner() {
                out.push(((self.f)(&v)?, m));
            }
            self.output.send(crate::multiset::Multiset::new(out));
        }
        Ok(())
    }
}

/// Like [`Filter`], but `p` can fail. See [`TryMap`].
pub struct TryFilter<A, F> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<A>,
    p: F,
}

impl<A, F> TryFilter<A, F>
where
    A: Clone + 'static,
    F: FnMut(&A) -> Result<bool, ExecError> + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>, p: F) -> Reader<A> {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(TryFilter {
            id,
            input,
            output: writer,
            p,
        }));
        out
    }
}

impl<A, F> Operator for TryFilter<A, F>
where
    A: Clone,
    F: FnMut(&A) -> Result<bool, ExecError>,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            let mut out = Vec::with_capacity(ms.len());
            for (v, m) in ms.into_inner() {
                if (self.p)(&v)? {
                    out.push((v, m));
                }
            }
            self.output.send(crate::multiset::Multiset::new(out));
        }
        Ok(())
    }
}

pub struct Filter<A, F> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<A>,
    p: F,
}

impl<A, F> Filter<A, F>
where
    A: Clone + 'static,
    F: FnMut(&A) -> bool + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>, p: F) -> Reader<A> {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Filter {
            id,
            input,
            output: writer,
            p,
        }));
        out
    }
}

impl<A, F> Operator for Filter<A, F>
where
    A: Clone,
    F: FnMut(&A) -> bool,
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            self.output.send(ms.filter(&mut self.p));
        }
        Ok(())
    }
}

pub struct Negate<A> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<A>,
}

impl<A: Clone + 'static> Negate<A> {
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>) -> Reader<A> {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Negate {
            id,
            input,
            output: writer,
        }));
        out
    }
}

impl<A: Clone> Operator for Negate<A> {
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            self.output.send(ms.negate());
        }
        Ok(())
    }
}

/// Binary linear: forwards each incoming multiset from either side
/// unchanged (bag union).
pub struct Concat<A> {
    id: OperatorId,
    left: Reader<A>,
    right: Reader<A>,
    output: Writer<A>,
}

impl<A: Clone + 'static> Concat<A> {
    pub fn wire(builder: &mut GraphBuilder, left: Reader<A>, right: Reader<A>) -> Reader<A> {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Concat {
            id,
            left,
            right,
            output: writer,
        }));
        out
    }
}

impl<A: Clone> Operator for Concat<A> {
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.left.is_empty() || !self.right.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.left.drain() {
            self.output.send(ms);
        }
        for ms in self.right.drain() {
            self.output.send(ms);
        }
        Ok(())
    }
}

/// Side-effecting passthrough; invokes `f` on each input multiset before
/// forwarding it unchanged.
pub struct SideEffect<A, F> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<A>,
    f: F,
}

impl<A, F> SideEffect<A, F>
where
    A: Clone + 'static,
    F: FnMut(&crate::multiset::Multiset<A>) + 'static,
{
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>, f: F) -> Reader<A> {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(SideEffect {
            id,
            input,
            output: writer,
            f,
        }));
        out
    }
}

impl<A, F> Operator for SideEffect<A, F>
where
    A: Clone,
    F: FnMut(&crate::multiset::Multiset<A>),
{
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            (self.f)(&ms);
            self.output.send(ms);
        }
        Ok(())
    }
}

/// Passthrough that logs a textual form of each multiset it sees.
pub struct Debug<A> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<A>,
    name: String,
    indent: bool,
}

impl<A: Clone + fmt::Debug + 'static> Debug<A> {
    pub fn wire(builder: &mut GraphBuilder, input: Reader<A>, name: impl Into<String>, indent: bool) -> Reader<A> {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let out = writer.new_reader();
        builder.register(Box::new(Debug {
            id,
            input,
            output: writer,
            name: name.into(),
            indent,
        }));
        out
    }
}

impl<A: Clone + fmt::Debug> Operator for Debug<A> {
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            tracing::debug!(operator = %self.name, "{}", ms.debug_string(self.indent));
            self.output.send(ms);
        }
        Ok(())
    }
}

/// Fans a single stream out to several independent readers. The graph's
/// edges are one-writer/many-reader, but a `Reader` only exposes the
/// consuming end; anywhere the compiler needs to feed one upstream result
/// into more than one downstream operator (a CTE/sub-query referenced
/// twice, or a join side that also needs an anti-join), it routes through
/// a `Tee` to get back a `Writer` it can call `new_reader()` on again.
pub struct Tee<A> {
    id: OperatorId,
    input: Reader<A>,
    output: Writer<A>,
}

impl<A: Clone + 'static> Tee<A> {
    /// Fans `input` out to exactly two readers.
    pub fn wire2(builder: &mut GraphBuilder, input: Reader<A>) -> [Reader<A>; 2] {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let r1 = writer.new_reader();
        let r2 = writer.new_reader();
        builder.register(Box::new(Tee {
            id,
            input,
            output: writer,
        }));
        [r1, r2]
    }

    /// Fans `input` out to exactly three readers.
    pub fn wire3(builder: &mut GraphBuilder, input: Reader<A>) -> [Reader<A>; 3] {
        let id = builder.alloc_id();
        let mut writer: Writer<A> = builder.writer();
        let r1 = writer.new_reader();
        let r2 = writer.new_reader();
        let r3 = writer.new_reader();
        builder.register(Box::new(Tee {
            id,
            input,
            output: writer,
        }));
        [r1, r2, r3]
    }
}

impl<A: Clone> Operator for Tee<A> {
    fn id(&self) -> OperatorId {
        self.id
    }

    fn has_work(&self) -> bool {
        !self.input.is_empty()
    }

    fn run(&mut self) -> Result<(), ExecError> {
        for ms in self.input.drain() {
            self.output.send(ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiset::Multiset;

    #[test]
    fn map_filter_pipeline() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<i32> = b.writer();
        let r0 = root.new_reader();
        let r1 = Map::wire(&mut b, r0, |v| v * 2);
        let r2 = Filter::wire(&mut b, r1, |v| *v > 2);
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(1, 1), (2, 1), (3, 1)]));
        g.run().unwrap();

        let out = r2.drain();
        let combined: Vec<_> = out.into_iter().flat_map(|m| m.into_inner()).collect();
        let mut sorted = combined;
        sorted.sort();
        assert_eq!(sorted, vec![(4, 1), (6, 1)]);
    }

    #[test]
    fn try_filter_propagates_errors_out_of_run() {
        let mut b = GraphBuilder::new();
        let mut root: Writer<i32> = b.writer();
        let r0 = root.new_reader();
        let _out = TryFilter::wire(&mut b, r0, |v: &i32| {
            if *v < 0 {
                Err(ExecError::TypeMismatch { message: "negative".into() })
            } else {
                Ok(*v > 0)
            }
        });
        let mut g = b.finalize();

        root.send(Multiset::new(vec![(-1, 1)]));
        assert!(g.run().is_err());
    }

    #[test]
    fn concat_is_union_of_both_sides() {
        let mut b = GraphBuilder::new();
        let mut left: Writer<i32> = b.writer();
        let mut right: Writer<i32> = b.writer();
        let rl = left.new_reader();
        let rr = right.new_reader();
        let out = Concat::wire(&mut b, rl, rr);
        let mut g = b.finalize();

        left.send(Multiset::new(vec![(1, 1)]));
        right.send(Multiset::new(vec![(2, 1)]));
        g.run().unwrap();

        let combined: Vec<_> = out.drain().into_iter().flat_map(|m| m.into_inner()).collect();
        let mut sorted = combined;
        sorted.sort();
        assert_eq!(sorted, vec![(1, 1), (2, 1)]);
    }
}
