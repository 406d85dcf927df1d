// Direct deallocation must leave managed objects exactly where they were.
//
// Each test releases storage directly and then checks that the owner's
// trace, finalise and destroy cycle still finds and processes the object.

mod common;

use common::{Journal, Node, Watched};
use regent::{ConstructionGuard, Object, Region, RegionType, V, VCown, release_storage};

#[test]
fn test_region_object_survives_direct_release() {
    let journal = Journal::new();
    let region = Region::new(RegionType::Trace);
    let target = V::allocate_in_region(&region, Watched::new(1, &journal)).unwrap();
    let holder = V::allocate_in_region(&region, Node::linked(0, target.as_object())).unwrap();

    release_storage(target.as_object().cast());
    release_storage(target.as_object().cast());

    assert!(region.contains(target.as_object()));
    assert_eq!(holder.references().as_slice(), &[target.as_object()]);
    assert!(std::ptr::eq(target.descriptor(), V::<Watched>::desc()));

    region.release();
    assert_eq!(journal.finalised(), 1);
    assert_eq!(journal.dropped(), 1);
}

#[test]
fn test_cown_survives_direct_release() {
    let journal = Journal::new();
    let cown = VCown::allocate_default(Watched::new(2, &journal)).unwrap();

    release_storage(cown.as_object().cast());

    assert_eq!(cown.reference_count(), 1);
    assert!(unsafe { cown.notify() });
    assert!(!unsafe { cown.as_object().as_ref() }.is_destroyed());

    drop(cown);
    assert_eq!(journal.notified(), 1);
    assert_eq!(journal.dropped(), 1);
}

#[test]
fn test_dropped_guard_keeps_object() {
    let journal = Journal::new();
    let region = Region::new(RegionType::Arena);
    let watched = V::allocate_in_region(&region, Watched::new(3, &journal)).unwrap();

    drop(ConstructionGuard::new(watched.as_object().cast()));

    assert!(!unsafe { watched.as_object().as_ref() }.is_destroyed());
    assert!(unsafe { Object::destruct(watched.as_object()) });
    assert_eq!(journal.dropped(), 1);
}
