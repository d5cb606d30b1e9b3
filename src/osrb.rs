use std::{
    borrow::Borrow,
    cell::Cell,
    cmp::{Ord, Ordering},
    mem,
    ops::{Bound, RangeBounds},
};

use rand::Rng;

use crate::depth::Depth;
use crate::error::Error;

// Slot index standing in for an empty child.
const NIL: u32 = u32::MAX;

const DANGLING: &str = "dangling arena slot, call the programmer";

thread_local! {
    // Single-slot cache for the ancestor-path buffer. Mutating calls
    // borrow it, clear it and return it; purely an allocation
    // amortization, never required for correctness.
    static PATH_CACHE: Cell<Option<Vec<u32>>> = Cell::new(None);
}

fn borrow_path() -> Vec<u32> {
    PATH_CACHE.with(|slot| match slot.take() {
        Some(mut path) => {
            path.clear();
            path
        }
        None => Vec::with_capacity(64),
    })
}

fn return_path(path: Vec<u32>) {
    PATH_CACHE.with(|slot| slot.set(Some(path)));
}

/// Osrb manage a single instance of in-memory index using an
/// order-statistics [red-black][rbt] tree. Every node carries the size of
/// its subtree, so ranked access costs O(log n) on top of the usual
/// key-based operations.
///
/// Nodes live in an arena of slots addressed by `u32` index and hold no
/// parent link. Mutating operations record the ancestor chain, with the
/// sibling at every level, into a path buffer while descending and
/// rebalance by indexing backward through it.
///
/// [rbt]: https://en.wikipedia.org/wiki/Red-black_tree
#[derive(Clone)]
pub struct Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    name: String,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<u32>,
    root: u32,
    seqno: u64, // bumped on every structural mutation.
}

/// Different ways to construct a new Osrb instance.
impl<K, V> Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Create an empty instance of Osrb, identified by `name`.
    /// Applications can choose unique names.
    pub fn new<S>(name: S) -> Osrb<K, V>
    where
        S: AsRef<str>,
    {
        Osrb {
            name: name.as_ref().to_string(),
            slots: Vec::new(),
            free: Vec::new(),
            root: NIL,
            seqno: 0,
        }
    }

    /// Create a new instance of Osrb tree and load it with entries
    /// from `iter`. Note that iterator should return (key, value) tuples,
    /// where key must be ``unique``, otherwise return [`Error::DuplicateKey`].
    pub fn load_from<S, I>(name: S, iter: I) -> Result<Osrb<K, V>, Error<K>>
    where
        S: AsRef<str>,
        I: Iterator<Item = (K, V)>,
    {
        let mut index = Osrb::new(name);
        for (key, value) in iter {
            index.create(key, value)?;
        }
        Ok(index)
    }
}

/// Maintenance API.
impl<K, V> Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Identify this instance. Applications can choose unique names while
    /// creating Osrb instances.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    /// Return number of entries in this instance. Reads the root's
    /// subtree-size, hence O(1).
    #[inline]
    pub fn len(&self) -> usize {
        self.size_of(self.root) as usize
    }

    /// Check whether this index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root == NIL
    }

    /// Return quickly with basic statisics, only entries() method is valid
    /// with this statisics.
    pub fn stats(&self) -> Stats {
        Stats::new(self.len(), mem::size_of::<Node<K, V>>())
    }
}

/// Write operations on Osrb instance.
impl<K, V> Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Create a new {key, value} entry in the index. If key is already
    /// present return [`Error::DuplicateKey`], without mutating the tree.
    pub fn create(&mut self, key: K, value: V) -> Result<(), Error<K>> {
        if self.root == NIL {
            self.root = self.alloc(key, value, true /*black*/);
            self.seqno += 1;
            return Ok(());
        }
        let mut path = borrow_path();
        let result = match self.locate(&key, Some(&mut path)) {
            Ordering::Equal => Err(Error::DuplicateKey),
            side => {
                self.attach(&mut path, side, key, value);
                Ok(())
            }
        };
        return_path(path);
        result
    }

    /// Set value for key. If there is an existing entry for key,
    /// overwrite the old value with new value and return the old value.
    /// Overwriting a value moves no node and does not invalidate cursors.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        if self.root == NIL {
            self.root = self.alloc(key, value, true /*black*/);
            self.seqno += 1;
            return None;
        }
        let mut path = borrow_path();
        let old_value = match self.locate(&key, Some(&mut path)) {
            Ordering::Equal => {
                let slot = path[path.len() - 1];
                Some(mem::replace(&mut self.node_mut(slot).value, value))
            }
            side => {
                self.attach(&mut path, side, key, value);
                None
            }
        };
        return_path(path);
        old_value
    }

    /// Remove key from this instance and return the exact stored entry.
    /// If key is not present, then remove is effectively a no-op.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.root == NIL {
            return None;
        }
        let mut path = borrow_path();
        let entry = match self.locate(key, Some(&mut path)) {
            Ordering::Equal => Some(self.detach(&mut path)),
            _ => None,
        };
        return_path(path);
        entry
    }

    /// Remove every entry from this instance.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = NIL;
        self.seqno += 1;
    }

    /// Validate the tree with following rules:
    ///
    /// * From root to any leaf, no consecutive reds allowed in its path.
    /// * Number of blacks should be same under left child and right child.
    /// * Make sure keys are in sorted order.
    /// * Make sure every node's subtree-size tallies with its children.
    ///
    /// Additionally return full statistics on the tree. Refer to [`Stats`]
    /// for more information.
    pub fn validate(&self) -> Result<Stats, Error<K>> {
        let mut stats = Stats::new(self.len(), mem::size_of::<Node<K, V>>());
        stats.set_depths(Depth::new());
        let fromred = self.is_red(self.root);
        let blacks = self.validate_tree(self.root, fromred, 0, 0, &mut stats)?;
        stats.set_blacks(blacks);
        Ok(stats)
    }
}

/// Read operations on Osrb instance.
impl<K, V> Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Get the value for key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut slot = self.root;
        while slot != NIL {
            let node = self.node(slot);
            slot = match key.cmp(node.key.borrow()) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return Some(node.value.clone()),
            };
        }
        None
    }

    /// Check whether key is present in the index.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut slot = self.root;
        while slot != NIL {
            let node = self.node(slot);
            slot = match key.cmp(node.key.borrow()) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return true,
            };
        }
        false
    }

    /// Get the entry holding the `rank`-th smallest key, zero based.
    /// Return [`Error::IndexOutOfRange`] if rank is not within ``0..len``.
    /// Descends by subtree-size, hence O(log n).
    pub fn get_by_rank(&self, rank: usize) -> Result<(K, V), Error<K>> {
        if rank >= self.len() {
            return Err(Error::IndexOutOfRange(rank, self.len()));
        }
        let mut slot = self.root;
        let mut rank = rank as u32;
        loop {
            if slot == NIL {
                panic!("get_by_rank(): size augmentation broken, call the programmer");
            }
            let node = self.node(slot);
            let lsize = self.size_of(node.left);
            slot = if rank < lsize {
                node.left
            } else if rank == lsize {
                break Ok((node.key.clone(), node.value.clone()));
            } else {
                rank -= lsize + 1;
                node.right
            };
        }
    }

    /// Return the rank of key, that is, the number of keys in this index
    /// smaller than key. Return None if key is not present.
    pub fn rank_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut slot = self.root;
        let mut rank = 0_usize;
        while slot != NIL {
            let node = self.node(slot);
            match key.cmp(node.key.borrow()) {
                Ordering::Less => slot = node.left,
                Ordering::Greater => {
                    rank += self.size_of(node.left) as usize + 1;
                    slot = node.right;
                }
                Ordering::Equal => {
                    return Some(rank + self.size_of(node.left) as usize);
                }
            }
        }
        None
    }

    /// Return the entry with the smallest key.
    pub fn min(&self) -> Option<(K, V)> {
        if self.root == NIL {
            return None;
        }
        let mut slot = self.root;
        loop {
            let node = self.node(slot);
            if node.left == NIL {
                break Some((node.key.clone(), node.value.clone()));
            }
            slot = node.left;
        }
    }

    /// Return the entry with the largest key.
    pub fn max(&self) -> Option<(K, V)> {
        if self.root == NIL {
            return None;
        }
        let mut slot = self.root;
        loop {
            let node = self.node(slot);
            if node.right == NIL {
                break Some((node.key.clone(), node.value.clone()));
            }
            slot = node.right;
        }
    }

    /// Return a uniformly random entry from this index, drawn by rank.
    pub fn random<R: Rng>(&self, rng: &mut R) -> Option<(K, V)> {
        if self.root == NIL {
            return None;
        }
        let rank = rng.gen_range(0, self.len());
        self.get_by_rank(rank).ok()
    }

    /// Return an iterator over all entries in this instance.
    pub fn iter(&self) -> Iter<K, V> {
        let mut stack = vec![];
        self.push_left_spine(&mut stack, self.root);
        Iter { tree: self, stack }
    }

    /// Range over all entries from low to high.
    pub fn range<Q, R>(&self, range: R) -> Range<K, V>
    where
        K: Borrow<Q>,
        R: RangeBounds<Q>,
        Q: Ord + ToOwned<Owned = K> + ?Sized,
    {
        let low: Bound<K> = match range.start_bound() {
            Bound::Included(key) => Bound::Included(key.to_owned()),
            Bound::Excluded(key) => Bound::Excluded(key.to_owned()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let high: Bound<K> = match range.end_bound() {
            Bound::Included(key) => Bound::Included(key.to_owned()),
            Bound::Excluded(key) => Bound::Excluded(key.to_owned()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let mut stack = vec![];
        self.seed_low(&mut stack, &low);
        Range {
            tree: self,
            stack,
            low,
            high,
        }
    }

    /// Create a versioned cursor positioned before the smallest key.
    /// The cursor snapshots this instance's version; any structural
    /// mutation after that makes the cursor stale.
    pub fn cursor(&self) -> Cursor {
        let mut stack = vec![];
        self.push_left_spine(&mut stack, self.root);
        Cursor {
            seqno: self.seqno,
            stack,
        }
    }

    /// Advance cursor to the in-order successor and return the entry the
    /// cursor moved over, or None once the traversal is exhausted. Return
    /// [`Error::StaleCursor`] if this instance was structurally mutated
    /// after the cursor was created.
    pub fn cursor_next(&self, cursor: &mut Cursor) -> Result<Option<(K, V)>, Error<K>> {
        if cursor.seqno != self.seqno {
            return Err(Error::StaleCursor);
        }
        match cursor.stack.pop() {
            None => Ok(None),
            Some(slot) => {
                let (entry, right) = {
                    let node = self.node(slot);
                    ((node.key.clone(), node.value.clone()), node.right)
                };
                self.push_left_spine(&mut cursor.stack, right);
                Ok(Some(entry))
            }
        }
    }
}

// Arena helpers. Nodes are allocated out of `slots` and addressed by
// index; a freed slot goes on the free-list for reuse.
impl<K, V> Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    fn alloc(&mut self, key: K, value: V, black: bool) -> u32 {
        let node = Node {
            key,
            value,
            black,
            size: 1,
            left: NIL,
            right: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                slot
            }
            None => {
                if self.slots.len() >= (NIL as usize) {
                    panic!("alloc(): arena is full, call the programmer");
                }
                self.slots.push(Some(node));
                (self.slots.len() - 1) as u32
            }
        }
    }

    fn dealloc(&mut self, slot: u32) -> Node<K, V> {
        let node = self.slots[slot as usize].take().expect(DANGLING);
        self.free.push(slot);
        node
    }

    #[inline]
    fn node(&self, slot: u32) -> &Node<K, V> {
        self.slots[slot as usize].as_ref().expect(DANGLING)
    }

    #[inline]
    fn node_mut(&mut self, slot: u32) -> &mut Node<K, V> {
        self.slots[slot as usize].as_mut().expect(DANGLING)
    }

    // Two distinct nodes borrowed mutably at once, for payload swaps.
    fn node_pair_mut(&mut self, a: u32, b: u32) -> (&mut Node<K, V>, &mut Node<K, V>) {
        let (a, b) = (a as usize, b as usize);
        if a < b {
            let (head, tail) = self.slots.split_at_mut(b);
            (
                head[a].as_mut().expect(DANGLING),
                tail[0].as_mut().expect(DANGLING),
            )
        } else if b < a {
            let (head, tail) = self.slots.split_at_mut(a);
            (
                tail[0].as_mut().expect(DANGLING),
                head[b].as_mut().expect(DANGLING),
            )
        } else {
            panic!("node_pair_mut(): same slot twice, call the programmer");
        }
    }

    #[inline]
    fn is_red(&self, slot: u32) -> bool {
        slot != NIL && !self.node(slot).black
    }

    #[inline]
    fn size_of(&self, slot: u32) -> u32 {
        if slot == NIL {
            0
        } else {
            self.node(slot).size
        }
    }

    fn fix_size(&mut self, slot: u32) {
        let (left, right) = {
            let node = self.node(slot);
            (node.left, node.right)
        };
        let size = 1 + self.size_of(left) + self.size_of(right);
        self.node_mut(slot).size = size;
    }
}

// Search and rebalancing. The path buffer records, from the root down,
// the sibling of the node about to be entered followed by the node
// itself:
//
//      [root, sib1, cur1, sib2, cur2, ...]
//
// For the node at even offset i, its parent is at i-2, its sibling at
// i-1, its uncle at i-3 and its grandparent at i-4. No parent pointers
// are stored in nodes; the buffer is the only ancestor context.
impl<K, V> Osrb<K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    // Binary-search descent. With a path buffer supplied, the buffer
    // ends at the node where the search terminated; the returned
    // ordering says whether key matched it or on which side key would
    // attach under it.
    fn locate<Q>(&self, key: &Q, mut path: Option<&mut Vec<u32>>) -> Ordering
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.root == NIL {
            panic!("locate(): tree is empty, call the programmer");
        }
        if let Some(path) = path.as_mut() {
            path.push(self.root);
        }
        let mut slot = self.root;
        loop {
            let node = self.node(slot);
            match key.cmp(node.key.borrow()) {
                Ordering::Equal => break Ordering::Equal,
                Ordering::Less => {
                    if node.left == NIL {
                        break Ordering::Less;
                    }
                    if let Some(path) = path.as_mut() {
                        path.push(node.right);
                        path.push(node.left);
                    }
                    slot = node.left;
                }
                Ordering::Greater => {
                    if node.right == NIL {
                        break Ordering::Greater;
                    }
                    if let Some(path) = path.as_mut() {
                        path.push(node.left);
                        path.push(node.right);
                    }
                    slot = node.right;
                }
            }
        }
    }

    // Point parent's child link (or the root) from `old` to `new`.
    fn relink(&mut self, parent: u32, old: u32, new: u32) {
        if parent == NIL {
            self.root = new;
        } else {
            let node = self.node_mut(parent);
            if node.left == old {
                node.left = new;
            } else if node.right == old {
                node.right = new;
            } else {
                panic!("relink(): broken path, call the programmer");
            }
        }
    }

    //        node                    x
    //        /  \                   / \
    //       /    \                 /   \
    //     left    x             node    xr
    //            / \            /  \
    //          xl   xr       left   xl
    //
    // Pure index swap; repairs the two touched subtree-sizes, colors are
    // the caller's business. Returns the subtree's new top, which the
    // caller must relink into the old top's parent.
    fn rotate_left(&mut self, node: u32) -> u32 {
        let x = self.node(node).right;
        if x == NIL {
            panic!("rotate_left(): rotating an empty child ? call the programmer");
        }
        let xl = self.node(x).left;
        self.node_mut(node).right = xl;
        self.node_mut(x).left = node;
        self.fix_size(node);
        self.fix_size(x);
        x
    }

    //        node                    x
    //        /  \                   / \
    //       /    \                 /   \
    //      x     right           xl    node
    //     / \                          /  \
    //   xl   xr                      xr    right
    //
    fn rotate_right(&mut self, node: u32) -> u32 {
        let x = self.node(node).left;
        if x == NIL {
            panic!("rotate_right(): rotating an empty child ? call the programmer");
        }
        let xr = self.node(x).right;
        self.node_mut(node).left = xr;
        self.node_mut(x).right = node;
        self.fix_size(node);
        self.fix_size(x);
        x
    }

    // Attach a red leaf under the path's last node, repair subtree-sizes
    // bottom-up and rebalance. `side` is the ordering locate() returned.
    fn attach(&mut self, path: &mut Vec<u32>, side: Ordering, key: K, value: V) {
        let leaf = self.alloc(key, value, false /*red*/);
        let parent = path[path.len() - 1];
        let sibling = {
            let node = self.node_mut(parent);
            match side {
                Ordering::Less => {
                    node.left = leaf;
                    node.right
                }
                _ => {
                    node.right = leaf;
                    node.left
                }
            }
        };
        path.push(sibling);
        path.push(leaf);
        for i in (0..path.len() - 1).step_by(2) {
            let slot = path[i];
            self.node_mut(slot).size += 1;
        }
        self.insert_fixup(path);
        let root = self.root;
        self.node_mut(root).black = true;
        self.seqno += 1;
    }

    // Restore the no-red-red invariant after attaching a red leaf. The
    // cursor starts at the leaf, the path's last entry.
    fn insert_fixup(&mut self, path: &mut Vec<u32>) {
        let mut i = path.len() - 1;
        loop {
            if i < 2 {
                break;
            }
            let parent = path[i - 2];
            if !self.is_red(parent) {
                break;
            }
            // A red parent cannot be the root, so the grandparent exists.
            let uncle = path[i - 3];
            let grand = path[i - 4];
            if self.is_red(uncle) {
                // Color flip only; sizes and shape stay put. Climb.
                self.node_mut(parent).black = true;
                self.node_mut(uncle).black = true;
                self.node_mut(grand).black = false;
                i -= 4;
                path.truncate(i + 1);
                continue;
            }
            // Black uncle: one of four rotation shapes settles it.
            let ganc = if i >= 6 { path[i - 6] } else { NIL };
            let cur = path[i];
            let parent_on_left = self.node(grand).left == parent;
            let cur_on_left = self.node(parent).left == cur;
            let top = match (parent_on_left, cur_on_left) {
                (true, true) => {
                    self.node_mut(parent).black = true;
                    self.node_mut(grand).black = false;
                    self.rotate_right(grand)
                }
                (true, false) => {
                    self.node_mut(cur).black = true;
                    self.node_mut(grand).black = false;
                    let left = self.rotate_left(parent);
                    self.node_mut(grand).left = left;
                    self.rotate_right(grand)
                }
                (false, false) => {
                    self.node_mut(parent).black = true;
                    self.node_mut(grand).black = false;
                    self.rotate_left(grand)
                }
                (false, true) => {
                    self.node_mut(cur).black = true;
                    self.node_mut(grand).black = false;
                    let right = self.rotate_right(parent);
                    self.node_mut(grand).right = right;
                    self.rotate_left(grand)
                }
            };
            self.relink(ganc, grand, top);
            break;
        }
    }

    // Splice out the node at the path's end. A node with both children
    // first swaps payloads with its in-order successor, extending the
    // path, so the slot actually freed has at most one child.
    fn detach(&mut self, path: &mut Vec<u32>) -> (K, V) {
        let target = path[path.len() - 1];
        let (tleft, tright) = {
            let node = self.node(target);
            (node.left, node.right)
        };
        if tleft != NIL && tright != NIL {
            path.push(tleft);
            path.push(tright);
            let mut slot = tright;
            loop {
                let (left, right) = {
                    let node = self.node(slot);
                    (node.left, node.right)
                };
                if left == NIL {
                    break;
                }
                path.push(right);
                path.push(left);
                slot = left;
            }
            let (t, s) = self.node_pair_mut(target, slot);
            mem::swap(&mut t.key, &mut s.key);
            mem::swap(&mut t.value, &mut s.value);
        }

        let i = path.len() - 1;
        let del = path[i];
        let (dleft, dright) = {
            let node = self.node(del);
            (node.left, node.right)
        };
        let child = if dleft != NIL { dleft } else { dright };
        let parent = if i == 0 { NIL } else { path[i - 2] };
        self.relink(parent, del, child);
        for k in (0..i).step_by(2) {
            let slot = path[k];
            self.node_mut(slot).size -= 1;
        }
        let node = self.dealloc(del);
        path[i] = child; // possibly a phantom NIL leaf.
        if node.black {
            self.delete_fixup(path);
            if self.root != NIL {
                let root = self.root;
                self.node_mut(root).black = true;
            }
        }
        self.seqno += 1;
        (node.key, node.value)
    }

    // Restore uniform black-height after removing a black node. The
    // cursor, the path's last entry, marks the position that is one
    // black short; it may be NIL.
    fn delete_fixup(&mut self, path: &mut Vec<u32>) {
        let mut i = path.len() - 1;
        loop {
            let cur = path[i];
            if self.is_red(cur) {
                self.node_mut(cur).black = true;
                break;
            }
            if i == 0 {
                // Black-height shrinks uniformly at the root.
                break;
            }
            let parent = path[i - 2];
            let sib = path[i - 1];
            // The cursor's side is read off the sibling, the cursor
            // itself may be NIL.
            let cur_on_left = self.node(parent).right == sib;
            if self.is_red(sib) {
                // Red sibling: rotate it up so the cases below see a
                // black one, then re-enter at the adjusted position.
                let ganc = if i >= 4 { path[i - 4] } else { NIL };
                self.node_mut(sib).black = true;
                self.node_mut(parent).black = false;
                let (top, step_sib, new_sib) = if cur_on_left {
                    let top = self.rotate_left(parent);
                    (top, self.node(top).right, self.node(parent).right)
                } else {
                    let top = self.rotate_right(parent);
                    (top, self.node(top).left, self.node(parent).left)
                };
                self.relink(ganc, parent, top);
                // The path gains one level between grandparent and
                // parent; splice it in and keep the cursor where it was.
                path[i - 2] = top;
                path[i - 1] = step_sib;
                path.insert(i, parent);
                path.insert(i + 1, new_sib);
                i += 2;
                continue;
            }
            let (near, far) = {
                let node = self.node(sib);
                if cur_on_left {
                    (node.left, node.right)
                } else {
                    (node.right, node.left)
                }
            };
            if !self.is_red(near) && !self.is_red(far) {
                // Both nephews black: push the deficit one level up.
                // The only case that can repeat, like a carry in
                // subtraction.
                self.node_mut(sib).black = false;
                i -= 2;
                path.truncate(i + 1);
                continue;
            }
            let ganc = if i >= 4 { path[i - 4] } else { NIL };
            let pblack = self.node(parent).black;
            let top = if self.is_red(far) {
                // Far nephew red: single rotation toward the cursor.
                self.node_mut(sib).black = pblack;
                self.node_mut(parent).black = true;
                self.node_mut(far).black = true;
                if cur_on_left {
                    self.rotate_left(parent)
                } else {
                    self.rotate_right(parent)
                }
            } else {
                // Near nephew red: double rotation brings it to the top
                // wearing the parent's old color.
                self.node_mut(near).black = pblack;
                self.node_mut(parent).black = true;
                if cur_on_left {
                    let right = self.rotate_right(sib);
                    self.node_mut(parent).right = right;
                    self.rotate_left(parent)
                } else {
                    let left = self.rotate_left(sib);
                    self.node_mut(parent).left = left;
                    self.rotate_right(parent)
                }
            };
            self.relink(ganc, parent, top);
            break;
        }
    }

    fn validate_tree(
        &self,
        slot: u32,
        fromred: bool,
        mut nb: usize,
        depth: usize,
        stats: &mut Stats,
    ) -> Result<usize, Error<K>> {
        if slot == NIL {
            stats.depths.as_mut().unwrap().sample(depth);
            return Ok(nb);
        }

        let red = self.is_red(slot);
        if fromred && red {
            return Err(Error::ConsecutiveReds);
        }
        if !red {
            nb += 1;
        }
        let node = self.node(slot);
        let (left, right) = (node.left, node.right);
        let lblacks = self.validate_tree(left, red, nb, depth + 1, stats)?;
        let rblacks = self.validate_tree(right, red, nb, depth + 1, stats)?;
        if lblacks != rblacks {
            let err = format!("left: {} right: {}", lblacks, rblacks);
            return Err(Error::UnbalancedBlacks(err));
        }
        let size = 1 + self.size_of(left) + self.size_of(right);
        if node.size != size {
            let err = format!("stored: {} computed: {}", node.size, size);
            return Err(Error::SizeMismatch(err));
        }
        if left != NIL {
            let lkey = &self.node(left).key;
            if lkey.ge(&node.key) {
                return Err(Error::SortError(lkey.clone(), node.key.clone()));
            }
        }
        if right != NIL {
            let rkey = &self.node(right).key;
            if rkey.le(&node.key) {
                return Err(Error::SortError(rkey.clone(), node.key.clone()));
            }
        }
        Ok(lblacks)
    }

    fn push_left_spine(&self, stack: &mut Vec<u32>, mut slot: u32) {
        while slot != NIL {
            stack.push(slot);
            slot = self.node(slot).left;
        }
    }

    fn push_right_spine(&self, stack: &mut Vec<u32>, mut slot: u32) {
        while slot != NIL {
            stack.push(slot);
            slot = self.node(slot).right;
        }
    }

    // Seed an in-order stack skipping every subtree entirely below low.
    fn seed_low(&self, stack: &mut Vec<u32>, low: &Bound<K>) {
        let mut slot = self.root;
        while slot != NIL {
            let node = self.node(slot);
            let within = match low {
                Bound::Included(key) => node.key.ge(key),
                Bound::Excluded(key) => node.key.gt(key),
                Bound::Unbounded => true,
            };
            if within {
                stack.push(slot);
                slot = node.left;
            } else {
                slot = node.right;
            }
        }
    }

    // Seed a reverse stack skipping every subtree entirely above high.
    fn seed_high(&self, stack: &mut Vec<u32>, high: &Bound<K>) {
        let mut slot = self.root;
        while slot != NIL {
            let node = self.node(slot);
            let within = match high {
                Bound::Included(key) => node.key.le(key),
                Bound::Excluded(key) => node.key.lt(key),
                Bound::Unbounded => true,
            };
            if within {
                stack.push(slot);
                slot = node.right;
            } else {
                slot = node.left;
            }
        }
    }
}

/// Versioned fail-fast cursor over an [`Osrb`] instance, created by the
/// [`Osrb::cursor`] API and advanced by the [`Osrb::cursor_next`] API.
/// Holds no borrow on the tree; instead every advance compares the
/// version snapshot taken at creation against the live tree and fails
/// with [`Error::StaleCursor`] on mismatch. Restartable only by creating
/// a new cursor.
pub struct Cursor {
    seqno: u64,
    stack: Vec<u32>,
}

pub struct Iter<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    tree: &'a Osrb<K, V>,
    stack: Vec<u32>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let slot = self.stack.pop()?;
        let node = tree.node(slot);
        tree.push_left_spine(&mut self.stack, node.right);
        Some((node.key.clone(), node.value.clone()))
    }
}

pub struct Range<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    tree: &'a Osrb<K, V>,
    stack: Vec<u32>,
    low: Bound<K>,
    high: Bound<K>,
}

impl<'a, K, V> Range<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    pub fn rev(self) -> Reverse<'a, K, V> {
        let mut stack = vec![];
        self.tree.seed_high(&mut stack, &self.high);
        Reverse {
            tree: self.tree,
            stack,
            low: self.low,
        }
    }
}

impl<'a, K, V> Iterator for Range<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let slot = self.stack.pop()?;
        let node = tree.node(slot);
        let within = match &self.high {
            Bound::Included(key) => node.key.le(key),
            Bound::Excluded(key) => node.key.lt(key),
            Bound::Unbounded => true,
        };
        if within {
            tree.push_left_spine(&mut self.stack, node.right);
            Some((node.key.clone(), node.value.clone()))
        } else {
            self.stack.clear();
            None
        }
    }
}

pub struct Reverse<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    tree: &'a Osrb<K, V>,
    stack: Vec<u32>,
    low: Bound<K>,
}

impl<'a, K, V> Iterator for Reverse<'a, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let slot = self.stack.pop()?;
        let node = tree.node(slot);
        let within = match &self.low {
            Bound::Included(key) => node.key.ge(key),
            Bound::Excluded(key) => node.key.gt(key),
            Bound::Unbounded => true,
        };
        if within {
            tree.push_right_spine(&mut self.stack, node.left);
            Some((node.key.clone(), node.value.clone()))
        } else {
            self.stack.clear();
            None
        }
    }
}

// A node in the arena. No parent link; `size` counts this node plus
// both subtrees and must tally at all times.
#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    black: bool,
    size: u32,
    left: u32,
    right: u32,
}

/// Statistics on [`Osrb`] tree. Serves two purpose:
///
/// * To get partial but quick statistics via [`Osrb::stats`] method.
/// * To get full statisics via [`Osrb::validate`] method.
#[derive(Default, Debug)]
pub struct Stats {
    entries: usize, // number of entries in the tree.
    node_size: usize,
    blacks: Option<usize>,
    depths: Option<Depth>,
}

impl Stats {
    fn new(entries: usize, node_size: usize) -> Stats {
        Stats {
            entries,
            node_size,
            blacks: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    fn set_blacks(&mut self, blacks: usize) {
        self.blacks = Some(blacks)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number entries in [`Osrb`] instance.
    #[inline]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Return node-size, including over-head for `Osrb<K,V>`. Although
    /// the node overhead is constant, the node size varies based on
    /// key and value types.
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return number of black nodes from root to leaf, on both left
    /// and right child.
    #[inline]
    pub fn blacks(&self) -> Option<usize> {
        self.blacks
    }

    /// Return [`Depth`] statistics.
    pub fn depths(&self) -> Option<Depth> {
        match &self.depths {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            _ => None,
        }
    }
}
