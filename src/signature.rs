//! Typed `extern "C"` signatures for foreign symbols.
//!
//! A signature is written as an argument tuple plus a result type, e.g.
//! `(*const c_char,)` and `*mut c_char`. [`ForeignSignature`] maps that pair
//! to the matching function pointer type and [`Invoke`] calls such a pointer
//! with the tuple spread into arguments.

macro_rules! for_each_arity {
    ($mac:ident) => {
        $mac!();
        $mac!(A1);
        $mac!(A1 A2);
        $mac!(A1 A2 A3);
        $mac!(A1 A2 A3 A4);
        $mac!(A1 A2 A3 A4 A5);
        $mac!(A1 A2 A3 A4 A5 A6);
    };
}

pub trait ForeignSignature {
    type Pointer: Copy;
}

macro_rules! impl_foreign_signature {
    ($($args:ident)*) => {
        impl<$($args,)* Res> ForeignSignature for (($($args,)*), Res) {
            type Pointer = unsafe extern "C" fn($($args),*) -> Res;
        }
    };
}

for_each_arity!(impl_foreign_signature);

pub trait Invoke<Res>: Sized
where
    (Self, Res): ForeignSignature,
{
    /// # Safety
    ///
    /// `func` must point to a live function whose real signature and
    /// contract match `(Self, Res)`.
    unsafe fn invoke(self, func: <(Self, Res) as ForeignSignature>::Pointer) -> Res;
}

macro_rules! impl_invoke {
    ($($args:ident)*) => {
        #[allow(non_snake_case)]
        impl<$($args,)* Res> Invoke<Res> for ($($args,)*) {
            unsafe fn invoke(self, func: unsafe extern "C" fn($($args),*) -> Res) -> Res {
                let ($($args,)*) = self;
                func($($args),*)
            }
        }
    };
}

for_each_arity!(impl_invoke);
