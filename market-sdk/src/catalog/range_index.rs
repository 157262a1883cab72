//! Height-balanced range trees for the price and sales indices.
//!
//! Nodes own disjoint `[range_start, range_end)` slices that together cover
//! `[0, u64::MAX)`. A node is addressed by its `range_start`, which never
//! changes: splitting a full node shrinks its end and hangs a successor node
//! for the upper half into the tree, then AVL rotations restore balance on the
//! path to the root. Links are addresses resolved through the working set.

use std::iter::once;

use solana_sdk::pubkey::Pubkey;

use crate::codec::AccountLayout;
use crate::constants::RANGE_DOMAIN_END;
use crate::errors::{SdkError, SdkResult};
use crate::pda::{price_index_pda, sales_index_pda};
use crate::state::{PriceIndexNode, ProductSales, RangeEntry, SalesIndexNode};
use crate::store::{AccountSource, WorkingSet};

/// Bounds every walk so a corrupt link cycle surfaces as an error.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeLinks {
    pub left: Option<Pubkey>,
    pub right: Option<Pubkey>,
    pub parent: Option<Pubkey>,
    pub height: u8,
}

/// Shared shape of price and sales nodes.
pub trait RangeNode: AccountLayout {
    fn derive_address(program_id: &Pubkey, range_start: u64) -> SdkResult<(Pubkey, u8)>;
    fn new_leaf(range_start: u64, range_end: u64, bump: u8) -> Self;
    fn range(&self) -> (u64, u64);
    fn set_range_end(&mut self, range_end: u64);
    fn entries(&self) -> &[RangeEntry];
    fn entries_mut(&mut self) -> &mut Vec<RangeEntry>;
    fn links(&self) -> TreeLinks;
    fn set_links(&mut self, links: TreeLinks);

    /// Hook run after the upper half of the entries moved into `upper`.
    fn split_into(&mut self, _upper: &mut Self) {}

    /// Hook run after `product_id` left this node.
    fn forget(&mut self, _product_id: u64) {}
}

impl RangeNode for PriceIndexNode {
    fn derive_address(program_id: &Pubkey, range_start: u64) -> SdkResult<(Pubkey, u8)> {
        price_index_pda(program_id, range_start)
    }

    fn new_leaf(range_start: u64, range_end: u64, bump: u8) -> Self {
        Self {
            range_start,
            range_end,
            entries: Vec::new(),
            left_child: None,
            right_child: None,
            parent: None,
            height: 1,
            bump,
        }
    }

    fn range(&self) -> (u64, u64) {
        (self.range_start, self.range_end)
    }

    fn set_range_end(&mut self, range_end: u64) {
        self.range_end = range_end;
    }

    fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<RangeEntry> {
        &mut self.entries
    }

    fn links(&self) -> TreeLinks {
        TreeLinks {
            left: self.left_child,
            right: self.right_child,
            parent: self.parent,
            height: self.height,
        }
    }

    fn set_links(&mut self, links: TreeLinks) {
        self.left_child = links.left;
        self.right_child = links.right;
        self.parent = links.parent;
        self.height = links.height;
    }
}

impl RangeNode for SalesIndexNode {
    fn derive_address(program_id: &Pubkey, range_start: u64) -> SdkResult<(Pubkey, u8)> {
        sales_index_pda(program_id, range_start)
    }

    fn new_leaf(range_start: u64, range_end: u64, bump: u8) -> Self {
        Self {
            range_start,
            range_end,
            entries: Vec::new(),
            top_items: Vec::new(),
            left_child: None,
            right_child: None,
            parent: None,
            height: 1,
            bump,
        }
    }

    fn range(&self) -> (u64, u64) {
        (self.range_start, self.range_end)
    }

    fn set_range_end(&mut self, range_end: u64) {
        self.range_end = range_end;
    }

    fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<RangeEntry> {
        &mut self.entries
    }

    fn links(&self) -> TreeLinks {
        TreeLinks {
            left: self.left_child,
            right: self.right_child,
            parent: self.parent,
            height: self.height,
        }
    }

    fn set_links(&mut self, links: TreeLinks) {
        self.left_child = links.left;
        self.right_child = links.right;
        self.parent = links.parent;
        self.height = links.height;
    }

    fn split_into(&mut self, upper: &mut Self) {
        let (keep, moved): (Vec<_>, Vec<_>) = std::mem::take(&mut self.top_items)
            .into_iter()
            .partition(|t| t.sales < upper.range_start);
        self.top_items = keep;
        upper.top_items = moved;
    }

    fn forget(&mut self, product_id: u64) {
        self.top_items.retain(|t| t.product_id != product_id);
    }
}

fn entry_key(e: &RangeEntry) -> (u64, u64) {
    (e.value, e.product_id)
}

fn corrupt<N: RangeNode>(what: String) -> SdkError {
    SdkError::InvalidData(format!("{} tree: {what}", N::NAME))
}

// ---------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------

/// Walks parent links up from the node at `range_start = 0`. `None` for an
/// empty tree.
pub fn find_root<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
) -> SdkResult<Option<Pubkey>> {
    let (first, _) = N::derive_address(program_id, 0)?;
    let Some(mut node) = ws.load::<N>(&first)? else {
        return Ok(None);
    };
    let mut address = first;
    for _ in 0..MAX_DEPTH {
        match node.links().parent {
            None => return Ok(Some(address)),
            Some(parent) => {
                address = parent;
                node = ws.require(&parent)?;
            }
        }
    }
    Err(corrupt::<N>("parent chain does not terminate".into()))
}

fn locate<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    root: Pubkey,
    value: u64,
) -> SdkResult<(Pubkey, N)> {
    let mut address = root;
    for _ in 0..MAX_DEPTH {
        let node: N = ws.require(&address)?;
        let (start, end) = node.range();
        let next = if value < start {
            node.links().left
        } else if value >= end {
            node.links().right
        } else {
            return Ok((address, node));
        };
        address = next.ok_or_else(|| corrupt::<N>(format!("no node covers value {value}")))?;
    }
    Err(corrupt::<N>(format!("search for {value} exceeded depth {MAX_DEPTH}")))
}

fn height_of<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    address: Option<Pubkey>,
) -> SdkResult<u8> {
    match address {
        None => Ok(0),
        Some(a) => Ok(ws.require::<N>(&a)?.links().height),
    }
}

fn set_parent<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    child: Option<Pubkey>,
    parent: Option<Pubkey>,
) -> SdkResult<()> {
    let Some(child) = child else { return Ok(()) };
    let mut node: N = ws.require(&child)?;
    let mut links = node.links();
    links.parent = parent;
    node.set_links(links);
    ws.store(&child, &node)
}

fn replace_child<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    parent: Option<Pubkey>,
    old: Pubkey,
    new: Pubkey,
) -> SdkResult<()> {
    let Some(parent) = parent else { return Ok(()) };
    let mut node: N = ws.require(&parent)?;
    let mut links = node.links();
    if links.left == Some(old) {
        links.left = Some(new);
    } else if links.right == Some(old) {
        links.right = Some(new);
    } else {
        return Err(corrupt::<N>(format!("{parent} is not the parent of {old}")));
    }
    node.set_links(links);
    ws.store(&parent, &node)
}

// ---------------------------------------------------------------------
// Rebalancing
// ---------------------------------------------------------------------

fn rotate_left<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    x_address: Pubkey,
) -> SdkResult<Pubkey> {
    let mut x: N = ws.require(&x_address)?;
    let mut xl = x.links();
    let y_address = xl
        .right
        .ok_or_else(|| corrupt::<N>(format!("left rotation at {x_address} without right child")))?;
    let mut y: N = ws.require(&y_address)?;
    let mut yl = y.links();
    let parent = xl.parent;

    xl.right = yl.left;
    set_parent::<N, S>(ws, yl.left, Some(x_address))?;
    yl.left = Some(x_address);
    yl.parent = parent;
    xl.parent = Some(y_address);
    xl.height = 1 + height_of::<N, S>(ws, xl.left)?.max(height_of::<N, S>(ws, xl.right)?);
    yl.height = 1 + xl.height.max(height_of::<N, S>(ws, yl.right)?);

    x.set_links(xl);
    y.set_links(yl);
    ws.store(&x_address, &x)?;
    ws.store(&y_address, &y)?;
    replace_child::<N, S>(ws, parent, x_address, y_address)?;
    tracing::debug!(kind = N::NAME, pivot = %y_address, "range tree rotate left");
    Ok(y_address)
}

fn rotate_right<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    x_address: Pubkey,
) -> SdkResult<Pubkey> {
    let mut x: N = ws.require(&x_address)?;
    let mut xl = x.links();
    let y_address = xl
        .left
        .ok_or_else(|| corrupt::<N>(format!("right rotation at {x_address} without left child")))?;
    let mut y: N = ws.require(&y_address)?;
    let mut yl = y.links();
    let parent = xl.parent;

    xl.left = yl.right;
    set_parent::<N, S>(ws, yl.right, Some(x_address))?;
    yl.right = Some(x_address);
    yl.parent = parent;
    xl.parent = Some(y_address);
    xl.height = 1 + height_of::<N, S>(ws, xl.left)?.max(height_of::<N, S>(ws, xl.right)?);
    yl.height = 1 + xl.height.max(height_of::<N, S>(ws, yl.left)?);

    x.set_links(xl);
    y.set_links(yl);
    ws.store(&x_address, &x)?;
    ws.store(&y_address, &y)?;
    replace_child::<N, S>(ws, parent, x_address, y_address)?;
    tracing::debug!(kind = N::NAME, pivot = %y_address, "range tree rotate right");
    Ok(y_address)
}

/// Fix heights and rotate where children differ by more than one, from
/// `from` up to the root.
fn rebalance_upward<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    from: Option<Pubkey>,
) -> SdkResult<()> {
    let mut current = from;
    for _ in 0..MAX_DEPTH {
        let Some(address) = current else { return Ok(()) };
        let mut node: N = ws.require(&address)?;
        let mut links = node.links();
        let hl = height_of::<N, S>(ws, links.left)?;
        let hr = height_of::<N, S>(ws, links.right)?;

        let top = if hl > hr.saturating_add(1) {
            let left = links
                .left
                .ok_or_else(|| corrupt::<N>(format!("{address} is left-heavy without a left child")))?;
            let child: N = ws.require(&left)?;
            let cl = child.links();
            if height_of::<N, S>(ws, cl.left)? < height_of::<N, S>(ws, cl.right)? {
                rotate_left::<N, S>(ws, left)?;
            }
            rotate_right::<N, S>(ws, address)?
        } else if hr > hl.saturating_add(1) {
            let right = links
                .right
                .ok_or_else(|| corrupt::<N>(format!("{address} is right-heavy without a right child")))?;
            let child: N = ws.require(&right)?;
            let cl = child.links();
            if height_of::<N, S>(ws, cl.right)? < height_of::<N, S>(ws, cl.left)? {
                rotate_right::<N, S>(ws, right)?;
            }
            rotate_left::<N, S>(ws, address)?
        } else {
            let height = 1 + hl.max(hr);
            if links.height != height {
                links.height = height;
                node.set_links(links);
                ws.store(&address, &node)?;
            }
            address
        };
        current = ws.require::<N>(&top)?.links().parent;
    }
    Err(corrupt::<N>(format!("rebalance exceeded depth {MAX_DEPTH}")))
}

/// Split a full node around the median of its values plus `incoming`.
fn split_node<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    address: Pubkey,
    mut node: N,
    incoming: u64,
) -> SdkResult<()> {
    let (start, end) = node.range();
    let mut values: Vec<u64> = node
        .entries()
        .iter()
        .map(|e| e.value)
        .chain(once(incoming))
        .collect();
    values.sort_unstable();
    let mut split = values[values.len() / 2];
    if values[0] == split {
        // lower half would be empty; move the cut past the run of equal values
        split = values.iter().copied().find(|v| *v > split).ok_or_else(|| {
            SdkError::IndexCapacityExceeded(format!(
                "{} node [{start}, {end}) is full of entries valued {split}",
                N::NAME
            ))
        })?;
    }

    let (upper_address, bump) = N::derive_address(program_id, split)?;
    if ws.exists(&upper_address)? {
        return Err(corrupt::<N>(format!("node for range start {split} already exists")));
    }
    let mut upper = N::new_leaf(split, end, bump);
    let at = node.entries().partition_point(|e| e.value < split);
    *upper.entries_mut() = node.entries_mut().split_off(at);
    node.set_range_end(split);
    node.split_into(&mut upper);

    // the upper half becomes the in-order successor
    let mut links = node.links();
    let parent = match links.right {
        None => {
            links.right = Some(upper_address);
            node.set_links(links);
            ws.store(&address, &node)?;
            address
        }
        Some(right) => {
            ws.store(&address, &node)?;
            let mut cursor = right;
            let mut attached = None;
            for _ in 0..MAX_DEPTH {
                let mut candidate: N = ws.require(&cursor)?;
                let mut cl = candidate.links();
                match cl.left {
                    Some(next) => cursor = next,
                    None => {
                        cl.left = Some(upper_address);
                        candidate.set_links(cl);
                        ws.store(&cursor, &candidate)?;
                        attached = Some(cursor);
                        break;
                    }
                }
            }
            attached.ok_or_else(|| corrupt::<N>("leftmost descent did not terminate".into()))?
        }
    };

    let mut ul = upper.links();
    ul.parent = Some(parent);
    ul.height = 1;
    upper.set_links(ul);
    ws.store(&upper_address, &upper)?;

    tracing::debug!(
        kind = N::NAME,
        range_start = start,
        split_at = split,
        range_end = end,
        node = %upper_address,
        "range node split"
    );
    rebalance_upward::<N, S>(ws, Some(parent))
}

/// Insert and return the address of the node that took the entry, or `None`
/// if the exact entry was already present.
fn insert_entry<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    entry: RangeEntry,
    capacity: usize,
) -> SdkResult<Option<Pubkey>> {
    if capacity < 2 {
        return Err(SdkError::InvalidArgument(format!(
            "node capacity {capacity} is below 2"
        )));
    }
    if entry.value >= RANGE_DOMAIN_END {
        return Err(SdkError::InvalidArgument(format!(
            "value {} is outside the indexable domain",
            entry.value
        )));
    }
    // at most one split is needed; the extra turns only guard against corruption
    for _ in 0..3 {
        let root = match find_root::<N, S>(ws, program_id)? {
            Some(root) => root,
            None => {
                let (address, bump) = N::derive_address(program_id, 0)?;
                ws.store(&address, &N::new_leaf(0, RANGE_DOMAIN_END, bump))?;
                tracing::debug!(kind = N::NAME, root = %address, "range tree created");
                address
            }
        };
        let (address, mut node) = locate::<N, S>(ws, root, entry.value)?;
        let pos = match node
            .entries()
            .binary_search_by_key(&entry_key(&entry), entry_key)
        {
            Ok(_) => return Ok(None),
            Err(pos) => pos,
        };
        if node.entries().len() < capacity {
            node.entries_mut().insert(pos, entry);
            ws.store(&address, &node)?;
            return Ok(Some(address));
        }
        split_node::<N, S>(ws, program_id, address, node, entry.value)?;
    }
    Err(SdkError::IndexCapacityExceeded(format!(
        "{} insert of value {} did not settle after splitting",
        N::NAME,
        entry.value
    )))
}

// ---------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------

/// File `product_id` under `value`. False if that exact pair is already indexed.
pub fn insert<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    product_id: u64,
    value: u64,
    capacity: usize,
) -> SdkResult<bool> {
    let entry = RangeEntry { product_id, value };
    Ok(insert_entry::<N, S>(ws, program_id, entry, capacity)?.is_some())
}

/// Nodes are never merged; an emptied node keeps its range.
pub fn remove<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    product_id: u64,
    value: u64,
) -> SdkResult<bool> {
    if value >= RANGE_DOMAIN_END {
        return Ok(false);
    }
    let Some(root) = find_root::<N, S>(ws, program_id)? else {
        return Ok(false);
    };
    let (address, mut node) = locate::<N, S>(ws, root, value)?;
    let key = (value, product_id);
    match node.entries().binary_search_by_key(&key, entry_key) {
        Ok(pos) => {
            node.entries_mut().remove(pos);
            node.forget(product_id);
            ws.store(&address, &node)?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

/// Move a product from `old_value` to `new_value`. False if it was not filed
/// under `old_value`.
pub fn update_value<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    product_id: u64,
    old_value: u64,
    new_value: u64,
    capacity: usize,
) -> SdkResult<bool> {
    if !remove::<N, S>(ws, program_id, product_id, old_value)? {
        return Ok(false);
    }
    insert::<N, S>(ws, program_id, product_id, new_value, capacity)?;
    Ok(true)
}

fn collect_range<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    address: Option<Pubkey>,
    lo: u64,
    hi: u64,
    out: &mut Vec<RangeEntry>,
    depth: usize,
) -> SdkResult<()> {
    let Some(address) = address else { return Ok(()) };
    if depth > MAX_DEPTH {
        return Err(corrupt::<N>(format!("range scan exceeded depth {MAX_DEPTH}")));
    }
    let node: N = ws.require(&address)?;
    let (start, end) = node.range();
    let links = node.links();
    if lo < start {
        collect_range::<N, S>(ws, links.left, lo, hi, out, depth + 1)?;
    }
    if lo < end && hi > start {
        out.extend(
            node.entries()
                .iter()
                .filter(|e| e.value >= lo && e.value < hi)
                .copied(),
        );
    }
    if hi > end {
        collect_range::<N, S>(ws, links.right, lo, hi, out, depth + 1)?;
    }
    Ok(())
}

/// Every entry with `lo <= value < hi`, ordered by value then product id.
pub fn query_range<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    lo: u64,
    hi: u64,
) -> SdkResult<Vec<RangeEntry>> {
    let mut out = Vec::new();
    if lo >= hi {
        return Ok(out);
    }
    let root = find_root::<N, S>(ws, program_id)?;
    collect_range::<N, S>(ws, root, lo, hi, &mut out, 0)?;
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub nodes: usize,
    pub entries: usize,
    pub height: u8,
}

struct ValidateCursor {
    next_start: u64,
    stats: TreeStats,
}

fn validate_subtree<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    address: Pubkey,
    expected_parent: Option<Pubkey>,
    cursor: &mut ValidateCursor,
    depth: usize,
) -> SdkResult<u8> {
    if depth > MAX_DEPTH {
        return Err(corrupt::<N>(format!("deeper than {MAX_DEPTH}")));
    }
    let node: N = ws.require(&address)?;
    let links = node.links();
    let (start, end) = node.range();
    if links.parent != expected_parent {
        return Err(corrupt::<N>(format!("{address} has a wrong parent link")));
    }
    if N::derive_address(program_id, start)?.0 != address {
        return Err(corrupt::<N>(format!("{address} is not the address for range start {start}")));
    }

    let hl = match links.left {
        Some(left) => validate_subtree::<N, S>(ws, program_id, left, Some(address), cursor, depth + 1)?,
        None => 0,
    };
    if start != cursor.next_start {
        return Err(corrupt::<N>(format!(
            "range [{start}, {end}) follows a range ending at {}",
            cursor.next_start
        )));
    }
    if start >= end {
        return Err(corrupt::<N>(format!("empty range [{start}, {end})")));
    }
    if let Some(e) = node.entries().iter().find(|e| e.value < start || e.value >= end) {
        return Err(corrupt::<N>(format!(
            "value {} filed outside [{start}, {end})",
            e.value
        )));
    }
    if node
        .entries()
        .windows(2)
        .any(|w| entry_key(&w[0]) >= entry_key(&w[1]))
    {
        return Err(corrupt::<N>(format!("entries of [{start}, {end}) are not sorted")));
    }
    cursor.next_start = end;
    cursor.stats.nodes += 1;
    cursor.stats.entries += node.entries().len();

    let hr = match links.right {
        Some(right) => validate_subtree::<N, S>(ws, program_id, right, Some(address), cursor, depth + 1)?,
        None => 0,
    };
    if hl.abs_diff(hr) > 1 {
        return Err(corrupt::<N>(format!(
            "{address} is unbalanced ({hl} vs {hr})"
        )));
    }
    let height = 1 + hl.max(hr);
    if links.height != height {
        return Err(corrupt::<N>(format!(
            "{address} records height {} but is {height}",
            links.height
        )));
    }
    Ok(height)
}

/// Check ordering, coverage, balance, heights and parent links of the whole tree.
pub fn validate<N: RangeNode, S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
) -> SdkResult<TreeStats> {
    let Some(root) = find_root::<N, S>(ws, program_id)? else {
        return Ok(TreeStats::default());
    };
    let mut cursor = ValidateCursor {
        next_start: 0,
        stats: TreeStats::default(),
    };
    let height = validate_subtree::<N, S>(ws, program_id, root, None, &mut cursor, 0)?;
    if cursor.next_start != RANGE_DOMAIN_END {
        return Err(corrupt::<N>(format!(
            "ranges stop at {} instead of covering the domain",
            cursor.next_start
        )));
    }
    cursor.stats.height = height;
    Ok(cursor.stats)
}

// ---------------------------------------------------------------------
// Sales tree
// ---------------------------------------------------------------------

/// Offer `sale` to a bounded top-K list: refresh an existing row, fill a free
/// slot, or evict the lowest seller if `sale` outranks it.
pub fn offer_top_item(items: &mut Vec<ProductSales>, sale: &ProductSales, capacity: usize) -> bool {
    if let Some(existing) = items.iter_mut().find(|t| t.product_id == sale.product_id) {
        *existing = sale.clone();
        return true;
    }
    if items.len() < capacity {
        items.push(sale.clone());
        return true;
    }
    let lowest = items
        .iter()
        .enumerate()
        .min_by_key(|(_, t)| t.sales)
        .map(|(i, t)| (i, t.sales));
    match lowest {
        Some((i, sales)) if sale.sales > sales => {
            items[i] = sale.clone();
            true
        }
        _ => false,
    }
}

/// File a product under its sales count and offer it to that node's top list.
pub fn record_sale<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    sale: &ProductSales,
    capacity: usize,
    top_items: usize,
) -> SdkResult<bool> {
    let entry = RangeEntry {
        product_id: sale.product_id,
        value: sale.sales,
    };
    let Some(address) = insert_entry::<SalesIndexNode, S>(ws, program_id, entry, capacity)? else {
        return Ok(false);
    };
    let mut node: SalesIndexNode = ws.require(&address)?;
    offer_top_item(&mut node.top_items, sale, top_items);
    ws.store(&address, &node)?;
    Ok(true)
}

/// Re-file a product whose sales count moved from `previous_sales`.
pub fn update_sales<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    sale: &ProductSales,
    previous_sales: u64,
    capacity: usize,
    top_items: usize,
) -> SdkResult<bool> {
    if !remove::<SalesIndexNode, S>(ws, program_id, sale.product_id, previous_sales)? {
        return Ok(false);
    }
    record_sale(ws, program_id, sale, capacity, top_items)?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestSeller {
    pub product_id: u64,
    pub sales: u64,
    /// Cached row from the node's top list, when it made the cut.
    pub detail: Option<ProductSales>,
}

fn collect_best<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    address: Option<Pubkey>,
    lo: u64,
    hi: u64,
    k: usize,
    out: &mut Vec<BestSeller>,
    depth: usize,
) -> SdkResult<()> {
    let Some(address) = address else { return Ok(()) };
    if out.len() >= k {
        return Ok(());
    }
    if depth > MAX_DEPTH {
        return Err(corrupt::<SalesIndexNode>(format!("scan exceeded depth {MAX_DEPTH}")));
    }
    let node: SalesIndexNode = ws.require(&address)?;
    if hi > node.range_end {
        collect_best(ws, node.right_child, lo, hi, k, out, depth + 1)?;
    }
    if lo < node.range_end && hi > node.range_start {
        for e in node.entries.iter().rev() {
            if out.len() >= k {
                return Ok(());
            }
            if e.value < lo || e.value >= hi {
                continue;
            }
            out.push(BestSeller {
                product_id: e.product_id,
                sales: e.value,
                detail: node
                    .top_items
                    .iter()
                    .find(|t| t.product_id == e.product_id)
                    .cloned(),
            });
        }
    }
    if lo < node.range_start {
        collect_best(ws, node.left_child, lo, hi, k, out, depth + 1)?;
    }
    Ok(())
}

/// Up to `k` products with `lo <= sales < hi`, best first. Walks the tree from
/// its highest range down and stops as soon as `k` are found.
pub fn best_sellers<S: AccountSource + ?Sized>(
    ws: &mut WorkingSet<'_, S>,
    program_id: &Pubkey,
    lo: u64,
    hi: u64,
    k: usize,
) -> SdkResult<Vec<BestSeller>> {
    let mut out = Vec::new();
    if lo >= hi || k == 0 {
        return Ok(out);
    }
    let root = find_root::<SalesIndexNode, S>(ws, program_id)?;
    collect_best(ws, root, lo, hi, k, &mut out, 0)?;
    Ok(out)
}
