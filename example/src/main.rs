use argstack::HeapStack;
use greenstack::{Continuation, Switcher};

fn main() {
    let switcher = Switcher::threaded(HeapStack::new(16 * 1024));

    // A continuation that keeps a running total across suspensions; every
    // resume adds the value sent in and yields the new total.
    let tally = Continuation::new(&switcher, |this| {
        let mut total = 0u32;
        loop {
            match this.switch(Some(total))? {
                Some(n) => total += n,
                None => return Ok(Some(total)),
            }
        }
    });

    let mut sent = tally.switch(None).unwrap();
    for n in 1..=5 {
        println!("total so far: {}", sent.unwrap());
        sent = tally.switch(Some(n)).unwrap();
    }

    let last = tally.switch(None).unwrap();
    println!("final total: {}", last.unwrap());
    assert_eq!(last, Some(15));
    assert!(tally.finished());
}
