//! Sandwich deli simulation.
//!
//! A single maker fills orders that several cashiers post to a bounded
//! corkboard. Cashiers park on `CASHIER_CV` while the board is full and on a
//! per-sandwich condition variable until their order is made; the maker parks
//! on `MAKER_CV` until the board fills, then repeatedly makes the order
//! closest to the last sandwich it made.

use coop_threads::Runtime;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

const LOCK: u64 = 1;
const CASHIER_CV: u64 = 1111;
const MAKER_CV: u64 = 2222;
const BOARD_CAP: usize = 3;

struct Deli {
    board: Vec<i64>,
    max_orders: usize,
    active_cashiers: usize,
    last_sandwich: i64,
}

fn cashier(rt: Arc<Runtime>, deli: Rc<RefCell<Deli>>, num: usize, orders: Vec<i64>) {
    rt.lock(LOCK).unwrap();

    for sandwich in orders {
        loop {
            // Borrows never survive across a blocking call.
            let full = {
                let d = deli.borrow();
                d.board.len() >= d.max_orders
            };
            if !full {
                break;
            }
            rt.wait(LOCK, CASHIER_CV).unwrap();
        }

        let board_now_full = {
            let mut d = deli.borrow_mut();
            d.board.push(sandwich);
            println!("POSTED: cashier {num} sandwich {sandwich}");
            d.board.len() == d.max_orders
        };
        if board_now_full {
            rt.signal(LOCK, MAKER_CV).unwrap();
        }

        // Each sandwich number doubles as its own condition variable.
        rt.wait(LOCK, sandwich as u64).unwrap();
        println!("READY: cashier {num} sandwich {sandwich}");

        rt.signal(LOCK, MAKER_CV).unwrap();
        rt.wait(LOCK, CASHIER_CV).unwrap();
    }

    deli.borrow_mut().active_cashiers -= 1;
    rt.signal(LOCK, MAKER_CV).unwrap();
    rt.unlock(LOCK).unwrap();
}

fn maker(rt: Arc<Runtime>, deli: Rc<RefCell<Deli>>, menus: Vec<Vec<i64>>) {
    let cashiers = menus.len();
    for (num, orders) in menus.into_iter().enumerate() {
        let rt_c = rt.clone();
        let deli_c = deli.clone();
        rt.spawn(move || cashier(rt_c, deli_c, num, orders)).unwrap();
    }
    deli.borrow_mut().active_cashiers = cashiers;

    rt.lock(LOCK).unwrap();

    while deli.borrow().active_cashiers > 0 {
        loop {
            let below_cap = {
                let d = deli.borrow();
                d.board.len() < d.max_orders
            };
            if !below_cap {
                break;
            }
            rt.broadcast(LOCK, CASHIER_CV).unwrap();
            rt.wait(LOCK, MAKER_CV).unwrap();

            let active = {
                let mut d = deli.borrow_mut();
                // Fewer cashiers than board slots can never fill the board.
                if d.active_cashiers < d.max_orders {
                    d.max_orders = d.active_cashiers;
                }
                d.active_cashiers
            };
            if active == 0 {
                rt.unlock(LOCK).unwrap();
                return;
            }
        }

        let made = {
            let mut d = deli.borrow_mut();
            let last = d.last_sandwich;
            let (loc, _) = d
                .board
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| (*s - last).abs())
                .unwrap();
            let closest = d.board.remove(loc);
            d.last_sandwich = closest;
            closest
        };

        rt.signal(LOCK, made as u64).unwrap();
        rt.wait(LOCK, MAKER_CV).unwrap();
    }

    rt.unlock(LOCK).unwrap();
}

fn main() {
    let menus = vec![vec![10, 4, 7], vec![2, 12, 5], vec![9, 3, 11]];

    let deli = Rc::new(RefCell::new(Deli {
        board: Vec::new(),
        max_orders: BOARD_CAP,
        active_cashiers: 0,
        last_sandwich: -1,
    }));

    let rt = Runtime::new();
    let rt_m = rt.clone();
    rt.start(move || maker(rt_m, deli, menus)).unwrap();
}
